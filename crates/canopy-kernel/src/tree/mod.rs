//! Virtual file tree abstraction.
//!
//! One contract, two backends:
//!
//! - [`Tree`] - Core trait for tree operations
//! - [`FilesystemTree`] - Read-only repository checkout on local disk
//! - [`RemoteTree`] - Mutable, namespaced tree over a [`KvStore`](crate::store::KvStore)
//! - [`TreeFactory`] - Builds a tree per request
//!
//! ## Design Decisions
//!
//! - **Flat keys, implicit directories**: the mutable tree stores one record
//!   per file; directories are shared path prefixes (see [`index`]).
//! - **Capability, not type**: callers check [`Tree::is_mutable`] before
//!   writing; writes on an immutable tree are [`TreeError::ReadOnly`].
//! - **Chunking is private**: oversized files are split by the remote
//!   backend and never visible through the trait.

pub mod backends;
mod error;
mod factory;
pub mod index;
mod ops;
mod types;

pub use backends::{FilesystemTree, RemoteTree};
pub use error::{TreeError, TreeResult};
pub use factory::TreeFactory;
pub use ops::Tree;
pub use types::{ChunkPolicy, FileSnapshot};

/// Reject paths no file can live at.
///
/// A leading `/` is tolerated and stripped by the backends; a trailing `/`
/// names a directory, never a file.
pub fn validate_path(path: &str) -> TreeResult<()> {
    if path.trim_matches('/').is_empty() {
        return Err(TreeError::invalid_argument("path must not be empty"));
    }
    if path.ends_with('/') {
        return Err(TreeError::invalid_argument(format!(
            "file path must not end with '/': {path}"
        )));
    }
    Ok(())
}

/// Validate a move request before it reaches [`Tree::move_file`].
pub fn check_move(path: &str, newpath: &str) -> TreeResult<()> {
    validate_path(path)?;
    validate_path(newpath)?;
    if path.trim_start_matches('/') == newpath.trim_start_matches('/') {
        return Err(TreeError::invalid_argument(format!(
            "cannot move {path} onto itself"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_move() {
        assert!(check_move("a", "b").is_ok());
        assert!(matches!(check_move("a", "a"), Err(TreeError::InvalidArgument(_))));
        assert!(matches!(check_move("", "b"), Err(TreeError::InvalidArgument(_))));
        assert!(matches!(check_move("a", "/"), Err(TreeError::InvalidArgument(_))));
        assert!(matches!(check_move("a", "d/"), Err(TreeError::InvalidArgument(_))));
        assert!(check_move("/a", "b").is_ok());
        assert!(matches!(check_move("/a", "a"), Err(TreeError::InvalidArgument(_))));
    }
}
