//! Record keys, values and write batches.
//!
//! Every key carries its namespace as the leading component, so a scan rooted
//! at one [`RootKey`] can never reach another namespace's records.

use std::fmt;
use std::time::SystemTime;

use crate::constants::ROOT_MARKER;

/// Root record of one namespace: `(namespace, "/")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootKey {
    namespace: String,
}

impl RootKey {
    /// Root key for `namespace`. The empty string is the default namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The fixed marker this root is named by.
    pub fn marker(&self) -> &'static str {
        ROOT_MARKER
    }

    /// Key of the file entry at `path` under this root.
    pub fn file(&self, path: impl Into<String>) -> RecordKey {
        RecordKey {
            namespace: self.namespace.clone(),
            path: path.into(),
            chunk: None,
        }
    }

    /// Key of chunk `index` owned by the file at `path`.
    pub fn chunk(&self, path: impl Into<String>, index: u32) -> RecordKey {
        RecordKey {
            namespace: self.namespace.clone(),
            path: path.into(),
            chunk: Some(index),
        }
    }

    /// Returns true if `key` lives under this root.
    pub fn contains(&self, key: &RecordKey) -> bool {
        key.namespace == self.namespace
    }
}

impl fmt::Display for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{}", self.namespace, ROOT_MARKER)
    }
}

/// Key of a file entry or of one of its chunks.
///
/// Ordering is namespace, then path, then file entry before its chunks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    namespace: String,
    path: String,
    chunk: Option<u32>,
}

impl RecordKey {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Path of the file entry (for chunks, the owning file's path).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Chunk sequence index, or `None` for a file entry.
    pub fn chunk_index(&self) -> Option<u32> {
        self.chunk
    }

    pub fn is_chunk(&self) -> bool {
        self.chunk.is_some()
    }

    pub fn root(&self) -> RootKey {
        RootKey::new(self.namespace.clone())
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{}{}", self.namespace, ROOT_MARKER, self.path)?;
        if let Some(index) = self.chunk {
            write!(f, "#{index}")?;
        }
        Ok(())
    }
}

/// File entry: inline contents or an ordered list of chunk indices, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub contents: Option<Vec<u8>>,
    pub chunk_refs: Vec<u32>,
}

impl FileRecord {
    pub fn inline(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: Some(contents.into()),
            chunk_refs: Vec::new(),
        }
    }

    pub fn chunked(chunk_refs: Vec<u32>) -> Self {
        Self {
            contents: None,
            chunk_refs,
        }
    }

    pub fn is_chunked(&self) -> bool {
        !self.chunk_refs.is_empty()
    }
}

/// Value stored under a [`RecordKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValue {
    File(FileRecord),
    Chunk(Vec<u8>),
}

/// A record as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub value: RecordValue,
    /// Assigned by the store on every write.
    pub updated: SystemTime,
    /// Commit version that last wrote this record. Strictly increasing per store.
    pub version: u64,
}

impl StoredRecord {
    pub fn as_file(&self) -> Option<&FileRecord> {
        match &self.value {
            RecordValue::File(file) => Some(file),
            RecordValue::Chunk(_) => None,
        }
    }
}

/// Commit guard: the record at `key` must still be at `version` (`None` = absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub key: RecordKey,
    pub version: Option<u64>,
}

/// A set of mutations applied atomically by [`KvStore::commit`](super::KvStore::commit).
///
/// Preconditions are checked first, then deletes are applied, then puts.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    preconditions: Vec<Precondition>,
    deletes: Vec<RecordKey>,
    puts: Vec<(RecordKey, RecordValue)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the commit unless `key` is still at `version`.
    pub fn require(&mut self, key: RecordKey, version: Option<u64>) -> &mut Self {
        self.preconditions.push(Precondition { key, version });
        self
    }

    pub fn put(&mut self, key: RecordKey, value: RecordValue) -> &mut Self {
        self.puts.push((key, value));
        self
    }

    pub fn delete(&mut self, key: RecordKey) -> &mut Self {
        self.deletes.push(key);
        self
    }

    pub fn preconditions(&self) -> &[Precondition] {
        &self.preconditions
    }

    pub fn deletes(&self) -> &[RecordKey] {
        &self.deletes
    }

    pub fn puts(&self) -> &[(RecordKey, RecordValue)] {
        &self.puts
    }

    /// Number of records written or deleted.
    pub fn len(&self) -> usize {
        self.deletes.len() + self.puts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.puts.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Precondition>, Vec<RecordKey>, Vec<(RecordKey, RecordValue)>) {
        (self.preconditions, self.deletes, self.puts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_carry_namespace() {
        let p1 = RootKey::new("p1");
        let p2 = RootKey::new("p2");
        let key = p1.file("k");
        assert!(p1.contains(&key));
        assert!(!p2.contains(&key));
        assert_ne!(key, p2.file("k"));
        assert_eq!(key.root(), p1);
    }

    #[test]
    fn test_file_sorts_before_its_chunks() {
        let root = RootKey::new("");
        let mut keys = vec![root.chunk("a", 2), root.chunk("a", 1), root.file("a")];
        keys.sort();
        assert_eq!(keys[0], root.file("a"));
        assert_eq!(keys[1].chunk_index(), Some(1));
        assert_eq!(keys[2].chunk_index(), Some(2));
    }

    #[test]
    fn test_display() {
        let root = RootKey::new("proj");
        assert_eq!(root.to_string(), "\"proj\"/");
        assert_eq!(root.chunk("a/b", 3).to_string(), "\"proj\"/a/b#3");
    }

    #[test]
    fn test_batch_len() {
        let root = RootKey::new("");
        let mut batch = WriteBatch::new();
        assert!(batch.is_empty());
        batch
            .require(root.file("a"), Some(1))
            .delete(root.file("a"))
            .put(root.file("b"), RecordValue::File(FileRecord::inline(b"x".to_vec())));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.preconditions().len(), 1);
    }
}
