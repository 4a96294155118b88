//! # Failing Store
//!
//! A [`KvStore`] wrapper that can simulate backend failures for testing
//! transactional tree operations. A failed commit never reaches the inner
//! store, exactly like a transaction the backend aborted.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::error::{StoreError, StoreResult};
use super::types::{RecordKey, RootKey, StoredRecord, WriteBatch};
use super::KvStore;

/// Policy for when failures should occur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Never fail (passthrough).
    Never,
    /// Let `n` commits through, then fail every commit after.
    AfterCommits(usize),
    /// Fail every commit.
    AllCommits,
    /// Fail every read (point, batch and scan).
    AllReads,
}

/// Wrapper around a store that can simulate failures.
#[derive(Debug)]
pub struct FailingStore<S> {
    inner: S,
    policy: FailurePolicy,
    commits: AtomicUsize,
}

impl<S: KvStore> FailingStore<S> {
    pub fn new(inner: S, policy: FailurePolicy) -> Self {
        Self {
            inner,
            policy,
            commits: AtomicUsize::new(0),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of commit attempts seen so far (failed ones included).
    pub fn commit_attempts(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn check_read(&self) -> StoreResult<()> {
        match self.policy {
            FailurePolicy::AllReads => Err(StoreError::unavailable("injected read failure")),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl<S: KvStore> KvStore for FailingStore<S> {
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<StoredRecord>> {
        self.check_read()?;
        self.inner.get(key).await
    }

    async fn get_many(&self, keys: &[RecordKey]) -> StoreResult<Vec<(RecordKey, StoredRecord)>> {
        self.check_read()?;
        self.inner.get_many(keys).await
    }

    async fn scan_keys(&self, root: &RootKey) -> StoreResult<Vec<RecordKey>> {
        self.check_read()?;
        self.inner.scan_keys(root).await
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let seen = self.commits.fetch_add(1, Ordering::SeqCst);
        let fail = match self.policy {
            FailurePolicy::AfterCommits(n) => seen >= n,
            FailurePolicy::AllCommits => true,
            FailurePolicy::Never | FailurePolicy::AllReads => false,
        };
        if fail {
            tracing::warn!(attempt = seen + 1, mutations = batch.len(), "injected commit failure");
            return Err(StoreError::unavailable("injected commit failure"));
        }
        self.inner.commit(batch).await
    }
}
