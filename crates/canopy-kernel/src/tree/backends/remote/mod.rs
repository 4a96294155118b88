//! Key-value store backed tree.
//!
//! Every file is one record keyed by path under the namespace's root key.
//! Directories are implicit path prefixes. Large files are chunked.

mod chunk;

use async_trait::async_trait;
use std::time::SystemTime;

use crate::store::{FileRecord, RecordKey, RootKey, SharedStore, StoredRecord, WriteBatch};
use crate::tree::error::{TreeError, TreeResult};
use crate::tree::index;
use crate::tree::ops::Tree;
use crate::tree::types::ChunkPolicy;
use crate::tree::validate_path;

/// Key form of a tree path: `/a.txt` and `a.txt` name the same file.
fn canonical(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Mutable tree over a [`KvStore`](crate::store::KvStore), scoped to one namespace.
///
/// Holds nothing but its root binding, chunk policy and store handle; all
/// durable state lives in the store.
#[derive(Debug, Clone)]
pub struct RemoteTree {
    root: RootKey,
    store: SharedStore,
    policy: ChunkPolicy,
}

impl RemoteTree {
    /// Bind a tree to `namespace` (empty for the default namespace).
    pub fn new(store: SharedStore, namespace: impl Into<String>) -> Self {
        Self {
            root: RootKey::new(namespace),
            store,
            policy: ChunkPolicy::default(),
        }
    }

    /// Use a different inline/chunk boundary.
    pub fn with_policy(mut self, policy: ChunkPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn namespace(&self) -> &str {
        self.root.namespace()
    }

    pub fn root(&self) -> &RootKey {
        &self.root
    }

    pub fn policy(&self) -> &ChunkPolicy {
        &self.policy
    }

    /// Load the file entry at `path` along with its record metadata.
    async fn load(&self, path: &str) -> TreeResult<Option<(FileRecord, StoredRecord)>> {
        let path = canonical(path);
        let key = self.root.file(path);
        let Some(record) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let file = record.as_file().cloned().ok_or_else(|| TreeError::Consistency {
            path: path.to_string(),
            missing: Vec::new(),
        })?;
        Ok(Some((file, record)))
    }

    /// Paths of every file entry under the root.
    async fn file_paths(&self) -> TreeResult<Vec<String>> {
        let keys = self.store.scan_keys(&self.root).await?;
        Ok(keys
            .into_iter()
            .filter(|k| !k.is_chunk())
            .map(|k| k.path().to_string())
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> TreeResult<()> {
        self.store.commit(batch).await?;
        Ok(())
    }
}

#[async_trait]
impl Tree for RemoteTree {
    fn is_mutable(&self) -> bool {
        true
    }

    async fn has_file(&self, path: &str) -> TreeResult<bool> {
        let path = canonical(path);
        // The root always exists, even with no files stored.
        if path.is_empty() {
            return Ok(true);
        }
        Ok(self.store.get(&self.root.file(path)).await?.is_some())
    }

    async fn has_directory(&self, path: &str) -> TreeResult<bool> {
        if index::normalize_dir(path).is_empty() {
            return Ok(true);
        }
        let paths = self.file_paths().await?;
        Ok(index::has_directory(paths.iter().map(String::as_str), path))
    }

    async fn get_file_contents(&self, path: &str) -> TreeResult<Option<Vec<u8>>> {
        let path = canonical(path);
        let Some((file, _)) = self.load(path).await? else {
            return Ok(None);
        };
        let contents = chunk::decode(self.store.as_ref(), &self.root, path, &file).await?;
        Ok(Some(contents))
    }

    async fn get_file_size(&self, path: &str) -> TreeResult<Option<u64>> {
        Ok(self
            .get_file_contents(path)
            .await?
            .map(|contents| contents.len() as u64))
    }

    async fn get_file_last_modified(&self, path: &str) -> TreeResult<Option<SystemTime>> {
        Ok(self.load(path).await?.map(|(_, record)| record.updated))
    }

    async fn list_directory(&self, path: Option<&str>) -> TreeResult<Vec<String>> {
        let paths = self.file_paths().await?;
        Ok(index::list_directory(paths.iter().map(String::as_str), path))
    }

    async fn set_file(&self, path: &str, contents: &[u8]) -> TreeResult<()> {
        validate_path(path)?;
        let path = canonical(path);
        let previous = self.load(path).await?;

        // Stale chunks are computed from this read, so it must still hold at commit.
        let mut batch = WriteBatch::new();
        batch.require(self.root.file(path), previous.as_ref().map(|(_, r)| r.version));
        let previous = previous.map(|(file, _)| file);
        chunk::stage(&mut batch, &self.root, path, contents, previous.as_ref(), &self.policy);

        if self.policy.is_inline(contents.len()) {
            tracing::debug!(namespace = %self.namespace(), path, size = contents.len(), "set file");
        } else {
            tracing::info!(
                namespace = %self.namespace(),
                path,
                size = contents.len(),
                chunks = self.policy.chunk_count(contents.len()),
                "set chunked file"
            );
        }
        self.commit(batch).await
    }

    async fn delete_path(&self, path: &str) -> TreeResult<bool> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Err(TreeError::invalid_argument("refusing to delete the root"));
        }
        let prefix = index::normalize_dir(path);

        // Chunk keys carry their owner's path, so they match with their file.
        let matched: Vec<RecordKey> = self
            .store
            .scan_keys(&self.root)
            .await?
            .into_iter()
            .filter(|k| k.path() == path || k.path().starts_with(&prefix))
            .collect();
        if matched.is_empty() {
            return Ok(false);
        }

        let mut batch = WriteBatch::new();
        for key in matched {
            batch.delete(key);
        }
        tracing::debug!(namespace = %self.namespace(), path, records = batch.len(), "delete path");
        self.commit(batch).await?;
        Ok(true)
    }

    async fn move_file(&self, path: &str, newpath: &str) -> TreeResult<bool> {
        validate_path(path)?;
        validate_path(newpath)?;
        let (path, newpath) = (canonical(path), canonical(newpath));
        let Some((file, record)) = self.load(path).await? else {
            return Ok(false);
        };
        let contents = chunk::decode(self.store.as_ref(), &self.root, path, &file).await?;
        let replaced = self.load(newpath).await?;

        let mut batch = WriteBatch::new();
        batch.require(self.root.file(path), Some(record.version));
        batch.require(self.root.file(newpath), replaced.as_ref().map(|(_, r)| r.version));
        let replaced = replaced.map(|(file, _)| file);
        chunk::stage_delete(&mut batch, &self.root, path, &file);
        chunk::stage(&mut batch, &self.root, newpath, &contents, replaced.as_ref(), &self.policy);

        tracing::info!(namespace = %self.namespace(), from = path, to = newpath, "move file");
        self.commit(batch).await?;
        Ok(true)
    }

    async fn clear(&self) -> TreeResult<()> {
        let keys = self.store.scan_keys(&self.root).await?;
        if keys.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        for key in keys {
            batch.delete(key);
        }
        tracing::info!(namespace = %self.namespace(), records = batch.len(), "clear tree");
        self.commit(batch).await
    }
}
