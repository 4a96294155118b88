//! Runtime configuration.
//!
//! Loaded from TOML. Every section and field is optional:
//!
//! ```toml
//! [store]
//! path = "/var/lib/canopy/canopy.db"   # absent: in-memory store
//!
//! [chunking]
//! max_inline_size = 921600
//!
//! [filesystem]
//! content_root = "/srv/content"        # holds repos/
//!
//! [resolver]
//! namespace_header = "X-Canopy-Current-Namespace"
//! query_param = "_canopy_project"
//! path_marker = "/_canopy/p"
//! platform_suffix = ".appspot.com"
//! default_hostname = "my-app.appspot.com"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::resolver::ResolverConfig;
use crate::store::{MemoryStore, SharedStore, SqliteStore, StoreResult};
use crate::tree::ChunkPolicy;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanopyConfig {
    pub store: StoreConfig,
    pub chunking: ChunkPolicy,
    pub filesystem: FilesystemConfig,
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. In-memory when absent.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Open the configured store.
    pub fn open(&self) -> StoreResult<SharedStore> {
        match &self.path {
            Some(path) => {
                tracing::info!(path = %path.display(), "opening sqlite store");
                Ok(Arc::new(SqliteStore::open(path)?))
            }
            None => {
                tracing::info!("using in-memory store");
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemConfig {
    /// Directory containing `repos/`.
    pub content_root: Option<PathBuf>,
}

impl CanopyConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking
            .validate()
            .map_err(|e| ConfigError::invalid("chunking.max_inline_size", e.to_string()))?;

        let resolver = &self.resolver;
        for (field, value) in [
            ("resolver.namespace_header", &resolver.namespace_header),
            ("resolver.query_param", &resolver.query_param),
            ("resolver.path_marker", &resolver.path_marker),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(field, "must not be empty"));
            }
        }
        if !resolver.path_marker.starts_with('/') {
            return Err(ConfigError::invalid(
                "resolver.path_marker",
                "must start with '/'",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_PROJECT_QUERY_PARAM, MAX_INLINE_SIZE};
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_is_default() {
        let config = CanopyConfig::from_toml_str("").unwrap();
        assert_eq!(config, CanopyConfig::default());
        assert_eq!(config.chunking.max_inline_size, MAX_INLINE_SIZE);
        assert_eq!(config.resolver.query_param, DEFAULT_PROJECT_QUERY_PARAM);
        assert!(config.store.path.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = CanopyConfig::from_toml_str(
            r#"
            [chunking]
            max_inline_size = 4096

            [resolver]
            default_hostname = "my-app.appspot.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.chunking.max_inline_size, 4096);
        assert_eq!(
            config.resolver.default_hostname.as_deref(),
            Some("my-app.appspot.com")
        );
        assert_eq!(config.resolver.path_marker, "/_canopy/p");
    }

    #[test]
    fn test_rejects_oversized_chunks() {
        let err = CanopyConfig::from_toml_str("[chunking]\nmax_inline_size = 2000000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "chunking.max_inline_size"));
    }

    #[test]
    fn test_rejects_bad_marker() {
        let err = CanopyConfig::from_toml_str("[resolver]\npath_marker = \"p\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            CanopyConfig::from_toml_str("[store\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("canopy.toml");
        std::fs::write(&path, "[store]\npath = \"canopy.db\"\n").unwrap();
        let config = CanopyConfig::load(&path).unwrap();
        assert_eq!(config.store.path, Some(PathBuf::from("canopy.db")));

        assert!(matches!(
            CanopyConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
