//! SQLite-backed key-value store.
//!
//! One `records` table keyed by `(namespace, root, path, chunk)`. File entries
//! use `chunk = 0`; chunks use their sequence index (starting at 1). Every
//! commit runs inside one SQLite transaction.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::error::{StoreError, StoreResult};
use super::types::{FileRecord, RecordKey, RecordValue, RootKey, StoredRecord, WriteBatch};
use super::KvStore;
use crate::constants::ROOT_MARKER;

/// How long a writer waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
-- File entries (chunk = 0) and their chunks (chunk >= 1)
CREATE TABLE IF NOT EXISTS records (
    namespace TEXT NOT NULL,
    root TEXT NOT NULL,
    path TEXT NOT NULL,
    chunk INTEGER NOT NULL DEFAULT 0,
    contents BLOB,
    chunk_refs TEXT,            -- JSON array of chunk indices, chunked files only
    updated INTEGER NOT NULL,   -- unix micros
    version INTEGER NOT NULL,
    PRIMARY KEY (namespace, root, path, chunk)
);

-- Store-wide counters
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
"#;

/// Database handle for tree records.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Maps a row from the records table.
#[derive(Debug)]
struct RecordRow {
    contents: Option<Vec<u8>>,
    chunk_refs: Option<String>,
    updated: i64,
    version: i64,
}

impl RecordRow {
    fn into_record(self, key: &RecordKey) -> StoreResult<StoredRecord> {
        let value = if key.is_chunk() {
            RecordValue::Chunk(self.contents.unwrap_or_default())
        } else {
            match self.chunk_refs {
                Some(refs) => {
                    let refs: Vec<u32> = serde_json::from_str(&refs)
                        .map_err(|e| StoreError::codec(key.to_string(), e.to_string()))?;
                    RecordValue::File(FileRecord::chunked(refs))
                }
                None => RecordValue::File(FileRecord::inline(self.contents.unwrap_or_default())),
            }
        };
        Ok(StoredRecord {
            value,
            updated: from_micros(self.updated),
            version: self.version as u64,
        })
    }
}

fn to_micros(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

fn from_micros(micros: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_micros(micros.max(0) as u64)
}

fn chunk_column(key: &RecordKey) -> i64 {
    key.chunk_index().map(i64::from).unwrap_or(0)
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn read_record(conn: &Connection, key: &RecordKey) -> StoreResult<Option<StoredRecord>> {
        let mut stmt = conn.prepare_cached(
            "SELECT contents, chunk_refs, updated, version FROM records
             WHERE namespace = ?1 AND root = ?2 AND path = ?3 AND chunk = ?4",
        )?;
        let row = stmt
            .query_row(
                params![key.namespace(), ROOT_MARKER, key.path(), chunk_column(key)],
                |row| {
                    Ok(RecordRow {
                        contents: row.get(0)?,
                        chunk_refs: row.get(1)?,
                        updated: row.get(2)?,
                        version: row.get(3)?,
                    })
                },
            )
            .optional()?;
        row.map(|row| row.into_record(key)).transpose()
    }

    fn current_version(tx: &Transaction<'_>, key: &RecordKey) -> StoreResult<Option<u64>> {
        let version: Option<i64> = tx
            .query_row(
                "SELECT version FROM records
                 WHERE namespace = ?1 AND root = ?2 AND path = ?3 AND chunk = ?4",
                params![key.namespace(), ROOT_MARKER, key.path(), chunk_column(key)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.map(|v| v as u64))
    }

    fn next_version(tx: &Transaction<'_>) -> StoreResult<i64> {
        tx.execute(
            "INSERT INTO store_meta (key, value) VALUES ('version', 1)
             ON CONFLICT(key) DO UPDATE SET value = value + 1",
            [],
        )?;
        let version = tx.query_row(
            "SELECT value FROM store_meta WHERE key = 'version'",
            [],
            |row| row.get(0),
        )?;
        Ok(version)
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<StoredRecord>> {
        let conn = self.conn.lock();
        Self::read_record(&conn, key)
    }

    async fn get_many(&self, keys: &[RecordKey]) -> StoreResult<Vec<(RecordKey, StoredRecord)>> {
        let conn = self.conn.lock();
        let mut found = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = Self::read_record(&conn, key)? {
                found.push((key.clone(), record));
            }
        }
        Ok(found)
    }

    async fn scan_keys(&self, root: &RootKey) -> StoreResult<Vec<RecordKey>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT path, chunk FROM records
             WHERE namespace = ?1 AND root = ?2
             ORDER BY path, chunk",
        )?;
        let rows = stmt.query_map(params![root.namespace(), root.marker()], |row| {
            let path: String = row.get(0)?;
            let chunk: i64 = row.get(1)?;
            Ok((path, chunk))
        })?;

        let mut keys = Vec::new();
        for row in rows {
            let (path, chunk) = row?;
            keys.push(if chunk == 0 {
                root.file(path)
            } else {
                root.chunk(path, chunk as u32)
            });
        }
        Ok(keys)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for pre in batch.preconditions() {
            if Self::current_version(&tx, &pre.key)? != pre.version {
                // Dropping the transaction rolls it back.
                return Err(StoreError::conflict(pre.key.to_string()));
            }
        }

        let version = Self::next_version(&tx)?;
        let updated = to_micros(SystemTime::now());
        let (_, deletes, puts) = batch.into_parts();

        for key in &deletes {
            tx.execute(
                "DELETE FROM records
                 WHERE namespace = ?1 AND root = ?2 AND path = ?3 AND chunk = ?4",
                params![key.namespace(), ROOT_MARKER, key.path(), chunk_column(key)],
            )?;
        }

        for (key, value) in &puts {
            let (contents, chunk_refs) = match value {
                RecordValue::File(file) if file.is_chunked() => {
                    let refs = serde_json::to_string(&file.chunk_refs)
                        .map_err(|e| StoreError::codec(key.to_string(), e.to_string()))?;
                    (None, Some(refs))
                }
                RecordValue::File(file) => (file.contents.as_deref(), None),
                RecordValue::Chunk(data) => (Some(data.as_slice()), None),
            };
            tx.execute(
                "INSERT OR REPLACE INTO records
                 (namespace, root, path, chunk, contents, chunk_refs, updated, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    key.namespace(),
                    ROOT_MARKER,
                    key.path(),
                    chunk_column(key),
                    contents,
                    chunk_refs,
                    updated,
                    version,
                ],
            )?;
        }

        tx.commit()?;
        tracing::debug!(version, deletes = deletes.len(), puts = puts.len(), "sqlite store commit");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_inline_and_chunked_records_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let root = RootKey::new("proj");

        let mut batch = WriteBatch::new();
        batch
            .put(root.file("small"), RecordValue::File(FileRecord::inline(b"abc".to_vec())))
            .put(root.file("empty"), RecordValue::File(FileRecord::inline(Vec::new())))
            .put(root.chunk("big", 1), RecordValue::Chunk(b"xy".to_vec()))
            .put(root.file("big"), RecordValue::File(FileRecord::chunked(vec![1])));
        store.commit(batch).await.unwrap();

        let small = store.get(&root.file("small")).await.unwrap().unwrap();
        assert_eq!(small.as_file(), Some(&FileRecord::inline(b"abc".to_vec())));

        let empty = store.get(&root.file("empty")).await.unwrap().unwrap();
        assert_eq!(empty.as_file(), Some(&FileRecord::inline(Vec::new())));

        let big = store.get(&root.file("big")).await.unwrap().unwrap();
        assert_eq!(big.as_file(), Some(&FileRecord::chunked(vec![1])));

        let chunk = store.get(&root.chunk("big", 1)).await.unwrap().unwrap();
        assert_eq!(chunk.value, RecordValue::Chunk(b"xy".to_vec()));
    }

    #[tokio::test]
    async fn test_scan_keys_scoped_and_ordered() {
        let store = SqliteStore::in_memory().unwrap();
        let a = RootKey::new("a");
        let b = RootKey::new("b");

        let mut batch = WriteBatch::new();
        batch
            .put(a.chunk("x", 1), RecordValue::Chunk(b"1".to_vec()))
            .put(a.file("x"), RecordValue::File(FileRecord::chunked(vec![1])))
            .put(b.file("x"), RecordValue::File(FileRecord::inline(b"2".to_vec())));
        store.commit(batch).await.unwrap();

        let keys = store.scan_keys(&a).await.unwrap();
        assert_eq!(keys, vec![a.file("x"), a.chunk("x", 1)]);
    }

    #[tokio::test]
    async fn test_conflict_rolls_back() {
        let store = SqliteStore::in_memory().unwrap();
        let root = RootKey::new("");

        let mut batch = WriteBatch::new();
        batch.put(root.file("a"), RecordValue::File(FileRecord::inline(b"1".to_vec())));
        store.commit(batch).await.unwrap();
        let version = store.get(&root.file("a")).await.unwrap().unwrap().version;

        let mut batch = WriteBatch::new();
        batch
            .delete(root.file("a"))
            .require(root.file("a"), Some(version + 1));
        assert!(matches!(
            store.commit(batch).await.unwrap_err(),
            StoreError::Conflict(_)
        ));
        assert!(store.get(&root.file("a")).await.unwrap().is_some());

        let mut batch = WriteBatch::new();
        batch.require(root.file("a"), Some(version)).delete(root.file("a"));
        store.commit(batch).await.unwrap();
        assert!(store.get(&root.file("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_versions_increase_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tree.db");
        let root = RootKey::new("");

        let first = {
            let store = SqliteStore::open(&path).unwrap();
            let mut batch = WriteBatch::new();
            batch.put(root.file("a"), RecordValue::File(FileRecord::inline(b"1".to_vec())));
            store.commit(batch).await.unwrap();
            store.get(&root.file("a")).await.unwrap().unwrap().version
        };

        let store = SqliteStore::open(&path).unwrap();
        let mut batch = WriteBatch::new();
        batch.put(root.file("a"), RecordValue::File(FileRecord::inline(b"2".to_vec())));
        store.commit(batch).await.unwrap();
        let record = store.get(&root.file("a")).await.unwrap().unwrap();
        assert!(record.version > first);
        assert_eq!(record.as_file(), Some(&FileRecord::inline(b"2".to_vec())));
    }
}
