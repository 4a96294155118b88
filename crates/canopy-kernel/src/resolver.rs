//! Project resolution.
//!
//! Every request is bound to one tenant namespace. The namespace comes from
//! the first of these that yields a non-empty value:
//!
//! 1. the override header (trusted, injected by the platform)
//! 2. the project query parameter
//! 3. a `{marker}/{id}/` prefix on the request path
//! 4. the request host
//! 5. the sticky project id, when the caller opts in
//!
//! No value means the default namespace.

use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::constants::{
    DEFAULT_NAMESPACE_HEADER, DEFAULT_PLATFORM_SUFFIX, DEFAULT_PROJECT_PATH_MARKER,
    DEFAULT_PROJECT_QUERY_PARAM, HOST_QUALIFIER_SEPARATOR,
};

/// Resolver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Header carrying a platform-injected namespace.
    pub namespace_header: String,
    /// Query parameter naming a project.
    pub query_param: String,
    /// Path prefix followed by `/{id}/`.
    pub path_marker: String,
    /// Platform host suffix, e.g. `.appspot.com`.
    pub platform_suffix: String,
    /// The deployment's own hostname, which names no project.
    pub default_hostname: Option<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            namespace_header: DEFAULT_NAMESPACE_HEADER.to_string(),
            query_param: DEFAULT_PROJECT_QUERY_PARAM.to_string(),
            path_marker: DEFAULT_PROJECT_PATH_MARKER.to_string(),
            platform_suffix: DEFAULT_PLATFORM_SUFFIX.to_string(),
            default_hostname: None,
        }
    }
}

/// The parts of an incoming request that can name a project.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Header names are stored lowercased.
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
    path_info: String,
    host: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Add every `name=value` pair of a raw query string.
    ///
    /// Names and values are form-decoded (`%XX` and `+`); the last occurrence
    /// of a name wins.
    pub fn with_query_string(mut self, query: &str) -> Self {
        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            self.query.insert(name.into_owned(), value.into_owned());
        }
        self
    }

    pub fn with_path(mut self, path_info: impl Into<String>) -> Self {
        self.path_info = path_info.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn path_info(&self) -> &str {
        &self.path_info
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
}

/// Most recent project id named by a query parameter or path marker.
///
/// Shared by one serving instance. Best effort: concurrent requests may
/// overwrite each other.
#[derive(Debug, Default)]
pub struct StickyProject {
    current: RwLock<Option<String>>,
}

impl StickyProject {
    pub fn get(&self) -> Option<String> {
        self.current.read().clone()
    }

    pub fn set(&self, project: &str) {
        *self.current.write() = Some(project.to_string());
    }

    pub fn clear(&self) {
        *self.current.write() = None;
    }
}

/// Maps requests to project ids.
#[derive(Debug, Clone)]
pub struct ProjectResolver {
    config: ResolverConfig,
    path_re: Regex,
    sticky: Arc<StickyProject>,
}

impl ProjectResolver {
    pub fn new(config: ResolverConfig, sticky: Arc<StickyProject>) -> Result<Self, ConfigError> {
        let marker = config.path_marker.trim_end_matches('/');
        let path_re = Regex::new(&format!("^{}/([^/]+)/", regex::escape(marker)))
            .map_err(|e| ConfigError::invalid("resolver.path_marker", e.to_string()))?;
        Ok(Self {
            config,
            path_re,
            sticky,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn sticky(&self) -> &Arc<StickyProject> {
        &self.sticky
    }

    /// Resolve the project for `ctx`; `None` selects the default namespace.
    ///
    /// A hit from the query parameter or path marker is remembered as the
    /// sticky project whether or not `use_sticky` is set. The sticky value
    /// is only consulted when `use_sticky` is set.
    pub fn resolve(&self, ctx: &RequestContext, use_sticky: bool) -> Option<String> {
        if let Some(project) = non_empty(ctx.header(&self.config.namespace_header)) {
            tracing::debug!(project, source = "header", "resolved project");
            return Some(project.to_string());
        }

        let requested = non_empty(ctx.query(&self.config.query_param))
            .map(|p| (p, "query"))
            .or_else(|| self.from_path(ctx.path_info()).map(|p| (p, "path")));
        if let Some((project, source)) = requested {
            self.sticky.set(project);
            tracing::debug!(project, source, "resolved project");
            return Some(project.to_string());
        }

        if let Some(project) = ctx.host().and_then(|host| self.from_host(host)) {
            tracing::debug!(project, source = "host", "resolved project");
            return Some(project.to_string());
        }

        if use_sticky {
            if let Some(project) = self.sticky.get().filter(|p| !p.is_empty()) {
                tracing::debug!(project = %project, source = "sticky", "resolved project");
                return Some(project);
            }
        }
        None
    }

    /// Project id from a `{marker}/{id}/` path prefix.
    pub fn from_path<'a>(&self, path_info: &'a str) -> Option<&'a str> {
        let caps = self.path_re.captures(path_info)?;
        non_empty(caps.get(1).map(|m| m.as_str()))
    }

    /// Project id encoded in a host name, if any.
    pub fn from_host<'a>(&self, host: &'a str) -> Option<&'a str> {
        let host = strip_port(host);
        if host.parse::<IpAddr>().is_ok() || !host.contains('.') {
            return None;
        }
        if let Some(default) = &self.config.default_hostname {
            if host.eq_ignore_ascii_case(strip_port(default)) {
                return None;
            }
        }

        let suffix = self.config.platform_suffix.as_str();
        let (name, under_platform) = match host.strip_suffix(suffix) {
            Some(rest) if !suffix.is_empty() => (rest, true),
            _ => (host, false),
        };

        let project = if let Some((project, _)) = name.split_once(HOST_QUALIFIER_SEPARATOR) {
            project
        } else if let Some((label, _)) = name.split_once('.') {
            label
        } else if under_platform {
            // Bare app id under the platform suffix.
            return None;
        } else {
            name
        };
        non_empty(Some(project))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literal, possibly with a port.
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}
