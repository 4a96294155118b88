//! Key-value store seam behind mutable trees.
//!
//! The store is the only shared mutable resource in the system. It owns
//! timestamps, versions, and the atomicity of multi-record commits.
//!
//! - [`KvStore`] - Core trait: point reads, batch reads, ancestor scans, commits
//! - [`MemoryStore`] - In-process store (tests, ephemeral trees)
//! - [`SqliteStore`] - Durable store on a single SQLite file
//! - [`FailingStore`] - Wrapper that injects failures for atomicity tests

mod error;
mod failing;
mod memory;
mod sqlite;
mod types;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub use error::{StoreError, StoreResult};
pub use failing::{FailingStore, FailurePolicy};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{
    FileRecord, Precondition, RecordKey, RecordValue, RootKey, StoredRecord, WriteBatch,
};

/// Core store operations.
///
/// Implementations must make [`commit`](KvStore::commit) atomic: either every
/// precondition holds and every mutation becomes visible together, or nothing
/// changes. No retries happen above this trait.
#[async_trait]
pub trait KvStore: Send + Sync + fmt::Debug {
    /// Fetch one record.
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<StoredRecord>>;

    /// Fetch several records.
    ///
    /// Missing keys are omitted. No ordering is guaranteed.
    async fn get_many(&self, keys: &[RecordKey]) -> StoreResult<Vec<(RecordKey, StoredRecord)>>;

    /// List every key under `root` (keys only, file entries and chunks).
    async fn scan_keys(&self, root: &RootKey) -> StoreResult<Vec<RecordKey>>;

    /// Apply a batch atomically.
    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
}

#[async_trait]
impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<StoredRecord>> {
        (**self).get(key).await
    }

    async fn get_many(&self, keys: &[RecordKey]) -> StoreResult<Vec<(RecordKey, StoredRecord)>> {
        (**self).get_many(keys).await
    }

    async fn scan_keys(&self, root: &RootKey) -> StoreResult<Vec<RecordKey>> {
        (**self).scan_keys(root).await
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        (**self).commit(batch).await
    }
}

/// Shared handle to a store.
pub type SharedStore = Arc<dyn KvStore>;
