//! In-memory key-value store.
//!
//! Used for testing and for ephemeral trees. All data is lost when dropped.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::SystemTime;

use super::error::{StoreError, StoreResult};
use super::types::{RecordKey, RootKey, StoredRecord, WriteBatch};
use super::KvStore;

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<RecordKey, StoredRecord>,
    version: u64,
}

/// In-memory store.
///
/// Thread-safe via an internal `RwLock`; a commit holds the write lock for its
/// whole duration, which makes every batch atomic and isolated.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all namespaces.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<StoredRecord>> {
        Ok(self.inner.read().records.get(key).cloned())
    }

    async fn get_many(&self, keys: &[RecordKey]) -> StoreResult<Vec<(RecordKey, StoredRecord)>> {
        let inner = self.inner.read();
        Ok(keys
            .iter()
            .filter_map(|key| inner.records.get(key).map(|r| (key.clone(), r.clone())))
            .collect())
    }

    async fn scan_keys(&self, root: &RootKey) -> StoreResult<Vec<RecordKey>> {
        let inner = self.inner.read();
        // The empty-path file key is the smallest key a namespace can hold.
        Ok(inner
            .records
            .range(root.file("")..)
            .take_while(|(key, _)| root.contains(key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut inner = self.inner.write();

        for pre in batch.preconditions() {
            let current = inner.records.get(&pre.key).map(|r| r.version);
            if current != pre.version {
                return Err(StoreError::conflict(pre.key.to_string()));
            }
        }

        let (_, deletes, puts) = batch.into_parts();
        inner.version += 1;
        let version = inner.version;
        let updated = SystemTime::now();

        for key in &deletes {
            inner.records.remove(key);
        }
        for (key, value) in puts {
            inner.records.insert(
                key,
                StoredRecord {
                    value,
                    updated,
                    version,
                },
            );
        }

        tracing::debug!(version, deletes = deletes.len(), "memory store commit");
        Ok(())
    }
}
