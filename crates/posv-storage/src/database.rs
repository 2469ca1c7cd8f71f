//! RocksDB database implementation.

use crate::batch::Op;
use crate::{Storage, StorageError, StorageResult, WriteBatch};
use rocksdb::{ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Column families for organizing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnFamily {
    /// Block headers indexed by hash.
    Headers,
    /// Signer-set snapshots indexed by `"posv-" ++ hash`.
    Snapshots,
    /// Node metadata.
    Metadata,
    /// Default column family (required by RocksDB).
    Default,
}

impl ColumnFamily {
    /// String name of the column family.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnFamily::Headers => "headers",
            ColumnFamily::Snapshots => "snapshots",
            ColumnFamily::Metadata => "metadata",
            ColumnFamily::Default => "default",
        }
    }

    /// All column families.
    pub fn all() -> &'static [ColumnFamily] {
        &[
            ColumnFamily::Headers,
            ColumnFamily::Snapshots,
            ColumnFamily::Metadata,
            ColumnFamily::Default,
        ]
    }
}

/// RocksDB database wrapper.
pub struct Database {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();
        info!("Opening database at {:?}", path);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(256);
        opts.set_keep_log_file_num(1);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ColumnFamily::all()
            .iter()
            .map(|cf| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                ColumnFamilyDescriptor::new(cf.name(), cf_opts)
            })
            .collect();

        let db =
            DBWithThreadMode::<MultiThreaded>::open_cf_descriptors(&opts, path, cf_descriptors)?;

        debug!("Database opened successfully");

        Ok(Self { db: Arc::new(db) })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> StorageResult<()> {
        for cf in ColumnFamily::all() {
            if let Some(handle) = self.db.cf_handle(cf.name()) {
                self.db.flush_cf(&handle)?;
            }
        }
        Ok(())
    }

    fn handle(&self, cf: ColumnFamily) -> StorageResult<Arc<rocksdb::BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(cf.name())
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(cf.name().to_string()))
    }
}

impl Storage for Database {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let handle = self.handle(cf)?;
        Ok(self.db.get_cf(&handle, key)?)
    }

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let handle = self.handle(cf)?;
        self.db.put_cf(&handle, key, value)?;
        Ok(())
    }

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<()> {
        let handle = self.handle(cf)?;
        self.db.delete_cf(&handle, key)?;
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut rocks_batch = rocksdb::WriteBatch::default();
        for op in batch.ops {
            match op {
                Op::Put { cf, key, value } => {
                    let handle = self.handle(cf)?;
                    rocks_batch.put_cf(&handle, &key, &value);
                }
                Op::Delete { cf, key } => {
                    let handle = self.handle(cf)?;
                    rocks_batch.delete_cf(&handle, &key);
                }
            }
        }
        self.db.write(rocks_batch)?;
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_put_get_delete() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path()).unwrap();

        db.put(ColumnFamily::Snapshots, b"posv-k", b"v").unwrap();
        assert_eq!(
            db.get(ColumnFamily::Snapshots, b"posv-k").unwrap(),
            Some(b"v".to_vec())
        );
        assert!(db.contains(ColumnFamily::Snapshots, b"posv-k").unwrap());

        db.delete(ColumnFamily::Snapshots, b"posv-k").unwrap();
        assert_eq!(db.get(ColumnFamily::Snapshots, b"posv-k").unwrap(), None);
    }

    #[test]
    fn test_column_families_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path()).unwrap();

        db.put(ColumnFamily::Headers, b"k", b"header").unwrap();
        assert_eq!(db.get(ColumnFamily::Snapshots, b"k").unwrap(), None);
    }

    #[test]
    fn test_write_batch_atomic() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path()).unwrap();

        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::Headers, b"a", b"1");
        batch.put(ColumnFamily::Snapshots, b"b", b"2");
        db.write_batch(batch).unwrap();

        assert_eq!(db.get(ColumnFamily::Headers, b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(db.get(ColumnFamily::Snapshots, b"b").unwrap(), Some(b"2".to_vec()));
    }
}
