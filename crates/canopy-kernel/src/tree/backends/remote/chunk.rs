//! Chunked encoding of file contents.
//!
//! Contents above the policy's inline size are split into chunk records keyed
//! `(namespace, path, index)` with indices starting at 1. The file entry keeps
//! the ordered index list. Nothing outside the remote tree sees chunks.

use crate::store::{FileRecord, KvStore, RecordKey, RecordValue, RootKey, StoredRecord, WriteBatch};
use crate::tree::error::{TreeError, TreeResult};
use crate::tree::types::ChunkPolicy;

/// Stage the records for `contents` at `path` into `batch`.
///
/// `previous` is the file entry being replaced, if any; its chunks that the
/// new version does not overwrite are deleted in the same batch.
pub(super) fn stage(
    batch: &mut WriteBatch,
    root: &RootKey,
    path: &str,
    contents: &[u8],
    previous: Option<&FileRecord>,
    policy: &ChunkPolicy,
) {
    let file = if policy.is_inline(contents.len()) {
        FileRecord::inline(contents)
    } else {
        let mut refs = Vec::with_capacity(policy.chunk_count(contents.len()));
        for (i, piece) in contents.chunks(policy.max_inline_size).enumerate() {
            let index = i as u32 + 1;
            batch.put(root.chunk(path, index), RecordValue::Chunk(piece.to_vec()));
            refs.push(index);
        }
        FileRecord::chunked(refs)
    };

    if let Some(previous) = previous {
        for &index in &previous.chunk_refs {
            if !file.chunk_refs.contains(&index) {
                batch.delete(root.chunk(path, index));
            }
        }
    }

    batch.put(root.file(path), RecordValue::File(file));
}

/// Stage deletion of the file entry at `path` and all of its chunks.
pub(super) fn stage_delete(batch: &mut WriteBatch, root: &RootKey, path: &str, file: &FileRecord) {
    for &index in &file.chunk_refs {
        batch.delete(root.chunk(path, index));
    }
    batch.delete(root.file(path));
}

/// Reconstruct a file's contents.
pub(super) async fn decode(
    store: &dyn KvStore,
    root: &RootKey,
    path: &str,
    file: &FileRecord,
) -> TreeResult<Vec<u8>> {
    if !file.is_chunked() {
        return Ok(file.contents.clone().unwrap_or_default());
    }

    let keys: Vec<RecordKey> = file
        .chunk_refs
        .iter()
        .map(|&index| root.chunk(path, index))
        .collect();
    let fetched = store.get_many(&keys).await?;
    assemble(path, &file.chunk_refs, fetched)
}

/// Concatenate fetched chunks in the order recorded on the file entry.
///
/// `fetched` may arrive in any order. Any missing chunk is a consistency
/// error; a partial file is never returned.
pub(super) fn assemble(
    path: &str,
    refs: &[u32],
    fetched: Vec<(RecordKey, StoredRecord)>,
) -> TreeResult<Vec<u8>> {
    let mut pieces: Vec<(u32, Vec<u8>)> = fetched
        .into_iter()
        .filter_map(|(key, record)| match (key.chunk_index(), record.value) {
            (Some(index), RecordValue::Chunk(data)) => Some((index, data)),
            _ => None,
        })
        .collect();
    pieces.sort_by_key(|(index, _)| *index);

    let missing: Vec<u32> = refs
        .iter()
        .copied()
        .filter(|index| pieces.binary_search_by_key(index, |(i, _)| *i).is_err())
        .collect();
    if !missing.is_empty() {
        tracing::error!(path, ?missing, "file references missing chunks");
        return Err(TreeError::Consistency {
            path: path.to_string(),
            missing,
        });
    }

    let total = pieces.iter().map(|(_, data)| data.len()).sum();
    let mut contents = Vec::with_capacity(total);
    for &index in refs {
        if let Ok(pos) = pieces.binary_search_by_key(&index, |(i, _)| *i) {
            contents.extend_from_slice(&pieces[pos].1);
        }
    }
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn policy(size: usize) -> ChunkPolicy {
        ChunkPolicy::new(size).unwrap()
    }

    fn stored(value: RecordValue) -> StoredRecord {
        StoredRecord {
            value,
            updated: SystemTime::now(),
            version: 1,
        }
    }

    #[test]
    fn test_stage_inline_at_boundary() {
        let root = RootKey::new("");
        let mut batch = WriteBatch::new();
        stage(&mut batch, &root, "f", &[7u8; 8], None, &policy(8));
        assert_eq!(batch.puts().len(), 1);
        assert_eq!(
            batch.puts()[0].1,
            RecordValue::File(FileRecord::inline(vec![7u8; 8]))
        );
    }

    #[test]
    fn test_stage_chunked_above_boundary() {
        let root = RootKey::new("");
        let mut batch = WriteBatch::new();
        stage(&mut batch, &root, "f", &[7u8; 17], None, &policy(8));

        let chunks: Vec<_> = batch.puts().iter().filter(|(k, _)| k.is_chunk()).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].1, RecordValue::Chunk(vec![7u8]));

        let (key, value) = batch.puts().last().unwrap();
        assert_eq!(key, &root.file("f"));
        assert_eq!(value, &RecordValue::File(FileRecord::chunked(vec![1, 2, 3])));
    }

    #[test]
    fn test_stage_drops_stale_chunks() {
        let root = RootKey::new("");
        let previous = FileRecord::chunked(vec![1, 2, 3]);
        let mut batch = WriteBatch::new();
        stage(&mut batch, &root, "f", &[1u8; 9], Some(&previous), &policy(8));
        assert_eq!(batch.deletes(), &[root.chunk("f", 3)]);

        let mut batch = WriteBatch::new();
        stage(&mut batch, &root, "f", b"tiny", Some(&previous), &policy(8));
        assert_eq!(batch.deletes().len(), 3);
    }

    #[test]
    fn test_assemble_reorders_chunks() {
        let root = RootKey::new("");
        let fetched = vec![
            (root.chunk("f", 3), stored(RecordValue::Chunk(b"c".to_vec()))),
            (root.chunk("f", 1), stored(RecordValue::Chunk(b"a".to_vec()))),
            (root.chunk("f", 2), stored(RecordValue::Chunk(b"b".to_vec()))),
        ];
        assert_eq!(assemble("f", &[1, 2, 3], fetched).unwrap(), b"abc");
    }

    #[test]
    fn test_assemble_missing_chunk_is_fatal() {
        let root = RootKey::new("");
        let fetched = vec![(root.chunk("f", 1), stored(RecordValue::Chunk(b"a".to_vec())))];
        match assemble("f", &[1, 2], fetched) {
            Err(TreeError::Consistency { path, missing }) => {
                assert_eq!(path, "f");
                assert_eq!(missing, vec![2]);
            }
            other => panic!("expected consistency error, got {other:?}"),
        }
    }
}
