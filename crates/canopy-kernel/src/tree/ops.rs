//! Tree operations trait.
//!
//! One contract over every backend. Callers branch on [`Tree::is_mutable`],
//! never on the concrete type.

use async_trait::async_trait;
use std::fmt;
use std::time::SystemTime;

use super::types::FileSnapshot;
use super::{TreeError, TreeResult};

/// Core tree operations.
///
/// Paths are forward-slash separated and relative to the tree root (no
/// leading slash). The mutating operations default to [`TreeError::ReadOnly`];
/// reaching them on an immutable tree is a caller bug.
#[async_trait]
pub trait Tree: Send + Sync + fmt::Debug {
    // ========================================================================
    // Capability
    // ========================================================================

    /// Returns true if this tree accepts writes.
    fn is_mutable(&self) -> bool;

    // ========================================================================
    // Reading
    // ========================================================================

    /// Returns true if a file exists at `path`.
    async fn has_file(&self, path: &str) -> TreeResult<bool>;

    /// Returns true if `path` is a directory. The root always exists.
    async fn has_directory(&self, path: &str) -> TreeResult<bool>;

    /// Read a whole file.
    async fn get_file_contents(&self, path: &str) -> TreeResult<Option<Vec<u8>>>;

    /// Size of a file in bytes.
    async fn get_file_size(&self, path: &str) -> TreeResult<Option<u64>>;

    /// Last modification time of a file.
    async fn get_file_last_modified(&self, path: &str) -> TreeResult<Option<SystemTime>>;

    /// List a directory, sorted ascending.
    ///
    /// `None` lists every file recursively from the root. The meaning of
    /// `Some(dir)` depends on the backend; see the implementations.
    async fn list_directory(&self, path: Option<&str>) -> TreeResult<Vec<String>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create or replace a file.
    async fn set_file(&self, _path: &str, _contents: &[u8]) -> TreeResult<()> {
        Err(TreeError::ReadOnly)
    }

    /// Delete the file at `path` and everything below it.
    ///
    /// Returns false if nothing matched.
    async fn delete_path(&self, _path: &str) -> TreeResult<bool> {
        Err(TreeError::ReadOnly)
    }

    /// Move a file. Returns false if the source does not exist.
    ///
    /// Callers must reject `newpath == path` first (see [`check_move`](super::check_move)).
    async fn move_file(&self, _path: &str, _newpath: &str) -> TreeResult<bool> {
        Err(TreeError::ReadOnly)
    }

    /// Delete every file in the tree.
    async fn clear(&self) -> TreeResult<()> {
        Err(TreeError::ReadOnly)
    }

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Snapshot every file in the tree, in path order.
    ///
    /// Entries that vanish between the listing and the read are skipped.
    async fn get_files(&self) -> TreeResult<Vec<FileSnapshot>> {
        let mut files = Vec::new();
        for file_path in self.list_directory(None).await? {
            let Some(contents) = self.get_file_contents(&file_path).await? else {
                continue;
            };
            let Some(last_modified) = self.get_file_last_modified(&file_path).await? else {
                continue;
            };
            files.push(FileSnapshot {
                path: file_path,
                contents,
                last_modified,
            });
        }
        Ok(files)
    }
}
