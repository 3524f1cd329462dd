//! # Outbound Ports (Driven Ports)
//!
//! The ordered key-value backend the message store is built on, plus the two
//! adapters that ship with it.

use crate::domain::errors::KVStoreError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Abstract interface for an ordered key-value database.
///
/// Keys are compared lexicographically; range scans return entries in key
/// order.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Delete a key.
    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch succeed, or NONE are applied.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// All entries with `start <= key < end`, in key order.
    fn range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError>;

    /// At most `limit` entries with `start <= key < end`, ascending or, with
    /// `reverse`, descending from the greatest key.
    fn range_limit(
        &self,
        start: &[u8],
        end: &[u8],
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        let mut entries = self.range(start, end)?;
        if reverse {
            entries.reverse();
        }
        entries.truncate(limit);
        Ok(entries)
    }

    /// Iterate over keys with a prefix.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        self.range(prefix, &crate::domain::keys::prefix_end(prefix))
    }
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key.
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

fn apply(data: &mut BTreeMap<Vec<u8>, Vec<u8>>, operations: Vec<BatchOperation>) {
    for op in operations {
        match op {
            BatchOperation::Put { key, value } => {
                data.insert(key, value);
            }
            BatchOperation::Delete { key } => {
                data.remove(&key);
            }
        }
    }
}

fn range_of<'a>(
    data: &'a BTreeMap<Vec<u8>, Vec<u8>>,
    start: &[u8],
    end: &[u8],
) -> impl DoubleEndedIterator<Item = (&'a Vec<u8>, &'a Vec<u8>)> + 'a {
    // BTreeMap::range panics on start > end.
    let (start, end) = if start <= end { (start, end) } else { (start, start) };
    data.range::<[u8], _>((
        std::ops::Bound::Included(start),
        std::ops::Bound::Excluded(end),
    ))
}

/// In-memory ordered key-value store.
#[derive(Default)]
pub struct InMemoryKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.data.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        apply(&mut self.data, operations);
        Ok(())
    }

    fn range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        Ok(range_of(&self.data, start, end)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn range_limit(
        &self,
        start: &[u8],
        end: &[u8],
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        let iter = range_of(&self.data, start, end).map(|(k, v)| (k.clone(), v.clone()));
        Ok(if reverse {
            iter.rev().take(limit).collect()
        } else {
            iter.take(limit).collect()
        })
    }
}

/// File-backed key-value store.
///
/// Holds the keyspace in memory and rewrites a snapshot file after every
/// batch. Suitable for development sessions that should survive a restart.
pub struct FileBackedKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    path: PathBuf,
}

impl FileBackedKVStore {
    /// Open (or create) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KVStoreError> {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read(&path) {
            Ok(bytes) => Self::decode(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(KVStoreError::IOError {
                    message: e.to_string(),
                })
            }
        };
        tracing::info!(path = %path.display(), keys = data.len(), "Opened file-backed store");
        Ok(Self { data, path })
    }

    // Format: [key_len:u32][key][value_len:u32][value]...
    fn decode(bytes: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, KVStoreError> {
        let corrupt = || KVStoreError::Backend {
            message: "truncated store file".into(),
        };
        let mut data = BTreeMap::new();
        let mut cursor = 0;
        let take = |cursor: &mut usize| -> Result<Vec<u8>, KVStoreError> {
            let len_bytes: [u8; 4] = bytes
                .get(*cursor..*cursor + 4)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(corrupt)?;
            let len = u32::from_le_bytes(len_bytes) as usize;
            *cursor += 4;
            let chunk = bytes.get(*cursor..*cursor + len).ok_or_else(corrupt)?;
            *cursor += len;
            Ok(chunk.to_vec())
        };
        while cursor < bytes.len() {
            let key = take(&mut cursor)?;
            let value = take(&mut cursor)?;
            data.insert(key, value);
        }
        Ok(data)
    }

    fn save_to_file(&self) -> Result<(), KVStoreError> {
        use std::io::Write;
        let io = |e: std::io::Error| KVStoreError::IOError {
            message: e.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }

        let mut bytes = Vec::new();
        for (key, value) in &self.data {
            bytes.extend_from_slice(&(key.len() as u32).to_le_bytes());
            bytes.extend_from_slice(key);
            bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
            bytes.extend_from_slice(value);
        }

        // Write atomically via temp file
        let temp_path = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&temp_path).map_err(io)?;
        file.write_all(&bytes).map_err(io)?;
        file.sync_all().map_err(io)?;
        std::fs::rename(&temp_path, &self.path).map_err(io)
    }
}

impl KeyValueStore for FileBackedKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.data.insert(key.to_vec(), value.to_vec());
        self.save_to_file()
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.data.remove(key);
        self.save_to_file()
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let backup = self.data.clone();
        apply(&mut self.data, operations);
        if let Err(e) = self.save_to_file() {
            self.data = backup;
            return Err(e);
        }
        Ok(())
    }

    fn range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        Ok(range_of(&self.data, start, end)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_is_ordered_and_half_open() {
        let mut store = InMemoryKVStore::new();
        for k in [3u8, 1, 2, 5] {
            store.put(&[b't', k], &[k]).unwrap();
        }
        let keys: Vec<u8> = store
            .range(&[b't', 1], &[b't', 5])
            .unwrap()
            .into_iter()
            .map(|(k, _)| k[1])
            .collect();
        assert_eq!(keys, vec![1, 2, 3]);
        let top: Vec<u8> = store
            .range_limit(&[b't'], &[b'u'], 2, true)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k[1])
            .collect();
        assert_eq!(top, vec![5, 3]);
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let mut store = InMemoryKVStore::new();
        store.put(b"a", b"1").unwrap();
        assert!(store.range(b"z", b"a").unwrap().is_empty());
    }

    #[test]
    fn test_batch_write_and_prefix_scan() {
        let mut store = InMemoryKVStore::new();
        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"p1".to_vec(), b"x".to_vec()),
                BatchOperation::put(b"p2".to_vec(), b"y".to_vec()),
                BatchOperation::put(b"q1".to_vec(), b"z".to_vec()),
                BatchOperation::delete(b"p2".to_vec()),
            ])
            .unwrap();
        assert_eq!(store.prefix_scan(b"p").unwrap().len(), 1);
        assert!(store.exists(b"q1").unwrap());
    }

    #[test]
    fn test_file_backed_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");
        {
            let mut store = FileBackedKVStore::open(&path).unwrap();
            store
                .atomic_batch_write(vec![BatchOperation::put(b"k".to_vec(), b"v".to_vec())])
                .unwrap();
        }
        let store = FileBackedKVStore::open(&path).unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_file_backed_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");
        std::fs::write(&path, [9, 0, 0, 0, 1]).unwrap();
        assert!(FileBackedKVStore::open(&path).is_err());
    }
}
