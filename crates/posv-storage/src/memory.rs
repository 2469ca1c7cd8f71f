//! In-memory storage backend for tests.

use crate::batch::Op;
use crate::{ColumnFamily, Storage, StorageResult, WriteBatch};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A `Storage` implementation backed by in-memory maps, one per column
/// family. Used by unit and integration tests that exercise snapshot
/// persistence without touching disk.
#[derive(Default)]
pub struct MemoryStorage {
    maps: RwLock<HashMap<ColumnFamily, HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStorage {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a column family.
    pub fn len(&self, cf: ColumnFamily) -> usize {
        self.maps.read().get(&cf).map_or(0, |m| m.len())
    }

    /// Whether a column family holds no entries.
    pub fn is_empty(&self, cf: ColumnFamily) -> bool {
        self.len(cf) == 0
    }
}

impl Storage for MemoryStorage {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .maps
            .read()
            .get(&cf)
            .and_then(|m| m.get(key))
            .cloned())
    }

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.maps
            .write()
            .entry(cf)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<()> {
        if let Some(m) = self.maps.write().get_mut(&cf) {
            m.remove(key);
        }
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut maps = self.maps.write();
        for op in batch.ops {
            match op {
                Op::Put { cf, key, value } => {
                    maps.entry(cf).or_default().insert(key, value);
                }
                Op::Delete { cf, key } => {
                    if let Some(m) = maps.get_mut(&cf) {
                        m.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip() {
        let store = MemoryStorage::new();
        store.put(ColumnFamily::Snapshots, b"posv-x", b"snap").unwrap();

        assert_eq!(
            store.get(ColumnFamily::Snapshots, b"posv-x").unwrap(),
            Some(b"snap".to_vec())
        );
        assert_eq!(store.len(ColumnFamily::Snapshots), 1);
        assert!(store.is_empty(ColumnFamily::Headers));

        store.delete(ColumnFamily::Snapshots, b"posv-x").unwrap();
        assert!(store.is_empty(ColumnFamily::Snapshots));
    }

    #[test]
    fn test_memory_storage_batch() {
        let store = MemoryStorage::new();
        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::Metadata, b"a", b"1");
        batch.put(ColumnFamily::Metadata, b"b", b"2");
        batch.delete(ColumnFamily::Metadata, b"a");
        store.write_batch(batch).unwrap();

        assert_eq!(store.get(ColumnFamily::Metadata, b"a").unwrap(), None);
        assert_eq!(
            store.get(ColumnFamily::Metadata, b"b").unwrap(),
            Some(b"2".to_vec())
        );
    }
}
