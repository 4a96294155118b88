//! Tree error types.

use std::io;
use thiserror::Error;

use crate::store::StoreError;

/// Tree error type.
///
/// Mutable trees report absent files as `Ok(None)`; only the immutable tree
/// surfaces [`TreeError::NotFound`] for reads.
#[derive(Debug, Error)]
pub enum TreeError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unsafe or malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Path escapes root (security violation).
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Tree is read-only.
    #[error("tree is read-only")]
    ReadOnly,

    /// A file references a chunk that does not exist.
    #[error("consistency error: {path} is missing chunks {missing:?}")]
    Consistency { path: String, missing: Vec<u32> },

    /// Backing store failure.
    #[error("backend failure: {0}")]
    Backend(#[from] StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TreeError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a PathEscapesRoot error.
    pub fn path_escapes_root(path: impl Into<String>) -> Self {
        Self::PathEscapesRoot(path.into())
    }

    /// Map an I/O error, turning `NotFound` into [`TreeError::NotFound`] for `path`.
    pub fn from_io(err: io::Error, path: &str) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_string())
        } else {
            Self::Io(err)
        }
    }

    /// Returns true for conditions a caller should report as a bad request.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::PathEscapesRoot(_) | Self::ReadOnly
        )
    }
}

/// Convert TreeError to std::io::Error for compatibility.
impl From<TreeError> for io::Error {
    fn from(e: TreeError) -> Self {
        match e {
            TreeError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            TreeError::InvalidArgument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            TreeError::PathEscapesRoot(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
            TreeError::ReadOnly => {
                io::Error::new(io::ErrorKind::PermissionDenied, "tree is read-only")
            }
            TreeError::Io(e) => e,
            other => io::Error::other(other.to_string()),
        }
    }
}

/// Tree result type.
pub type TreeResult<T> = Result<T, TreeError>;
