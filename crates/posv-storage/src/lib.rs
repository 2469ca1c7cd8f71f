//! # posv-storage
//!
//! Storage layer for the PoSV node.
//!
//! This crate provides a RocksDB-based key-value abstraction with column
//! families for the data the consensus engine persists:
//!
//! - `Headers`: block headers indexed by hash
//! - `Snapshots`: signer-set snapshots indexed by `"posv-" ++ hash`
//! - `Metadata`: node metadata

mod batch;
mod database;
mod error;
mod memory;

pub use batch::WriteBatch;
pub use database::{ColumnFamily, Database};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;

/// Storage trait abstracting the database backend.
///
/// Consensus code only sees this trait; tests run against [`MemoryStorage`]
/// while the node wires in [`Database`].
pub trait Storage: Send + Sync {
    /// Get a value by key from a column family.
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Put a key-value pair into a column family.
    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Delete a key from a column family.
    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<()>;

    /// Check if a key exists in a column family.
    fn contains(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(cf, key)?.is_some())
    }

    /// Execute a batch of writes atomically.
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()>;
}

impl<S: Storage + ?Sized> Storage for std::sync::Arc<S> {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(cf, key)
    }

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> StorageResult<()> {
        (**self).put(cf, key, value)
    }

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<()> {
        (**self).delete(cf, key)
    }

    fn contains(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<bool> {
        (**self).contains(cf, key)
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        (**self).write_batch(batch)
    }
}
