//! Core tree types.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use super::error::{TreeError, TreeResult};
use crate::constants::{BACKEND_MAX_RECORD_SIZE, MAX_INLINE_SIZE};

/// Inline/chunked boundary for mutable trees.
///
/// Files up to `max_inline_size` bytes are stored inline; larger files are
/// split into chunks of at most `max_inline_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkPolicy {
    pub max_inline_size: usize,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            max_inline_size: MAX_INLINE_SIZE,
        }
    }
}

impl ChunkPolicy {
    /// Create a policy, rejecting sizes that would not fit a backend record.
    pub fn new(max_inline_size: usize) -> TreeResult<Self> {
        let policy = Self { max_inline_size };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> TreeResult<()> {
        if self.max_inline_size == 0 || self.max_inline_size >= BACKEND_MAX_RECORD_SIZE {
            return Err(TreeError::invalid_argument(format!(
                "max_inline_size must be in 1..{BACKEND_MAX_RECORD_SIZE}, got {}",
                self.max_inline_size
            )));
        }
        Ok(())
    }

    /// Returns true if `len` bytes are stored inline.
    pub fn is_inline(&self, len: usize) -> bool {
        len <= self.max_inline_size
    }

    /// Number of chunk records needed for `len` bytes (0 when inline).
    pub fn chunk_count(&self, len: usize) -> usize {
        if self.is_inline(len) {
            0
        } else {
            len.div_ceil(self.max_inline_size)
        }
    }
}

/// A file's path, contents and modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub path: String,
    pub contents: Vec<u8>,
    pub last_modified: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_count() {
        let policy = ChunkPolicy::new(10).unwrap();
        assert_eq!(policy.chunk_count(0), 0);
        assert_eq!(policy.chunk_count(10), 0);
        assert_eq!(policy.chunk_count(11), 2);
        assert_eq!(policy.chunk_count(20), 2);
        assert_eq!(policy.chunk_count(21), 3);
    }

    #[test]
    fn test_policy_bounds() {
        assert!(ChunkPolicy::new(0).is_err());
        assert!(ChunkPolicy::new(BACKEND_MAX_RECORD_SIZE).is_err());
        assert!(ChunkPolicy::new(BACKEND_MAX_RECORD_SIZE - 1).is_ok());
        assert!(ChunkPolicy::default().validate().is_ok());
    }
}
