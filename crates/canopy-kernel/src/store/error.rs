//! Store error types.

use thiserror::Error;

/// Error raised by a [`KvStore`](super::KvStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A commit precondition no longer holds; nothing was written.
    #[error("transaction conflict on {0}")]
    Conflict(String),

    /// The backend refused or failed the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Stored metadata could not be decoded.
    #[error("corrupt record {key}: {reason}")]
    Codec { key: String, reason: String },
}

impl StoreError {
    /// Create a Conflict error.
    pub fn conflict(key: impl Into<String>) -> Self {
        Self::Conflict(key.into())
    }

    /// Create an Unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a Codec error.
    pub fn codec(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Codec {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Store result type.
pub type StoreResult<T> = Result<T, StoreError>;
