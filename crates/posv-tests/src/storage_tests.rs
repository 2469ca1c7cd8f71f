//! Storage suite: snapshot persistence against the real RocksDB backend.

use crate::harness::TestDatabase;
use posv_consensus::Snapshot;
use posv_primitives::{Address, B256};
use posv_storage::{ColumnFamily, Database, Storage, WriteBatch};
use tempfile::TempDir;

fn sample_snapshot() -> Snapshot {
    Snapshot::new(
        42,
        B256::repeat_byte(0x42),
        (1..=3).map(Address::repeat_byte),
    )
}

#[test]
fn test_snapshot_roundtrip_on_rocksdb() {
    let db = TestDatabase::new();
    let snap = sample_snapshot();

    snap.store(db.db()).unwrap();
    let loaded = Snapshot::load(db.db(), &snap.hash).unwrap().unwrap();
    assert_eq!(loaded, snap);

    assert!(Snapshot::load(db.db(), &B256::repeat_byte(0x43))
        .unwrap()
        .is_none());
}

#[test]
fn test_snapshot_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let snap = sample_snapshot();

    {
        let db = Database::open(dir.path()).unwrap();
        snap.store(&db).unwrap();
        db.flush().unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    let loaded = Snapshot::load(&db, &snap.hash).unwrap().unwrap();
    assert_eq!(loaded, snap);
}

#[test]
fn test_batched_writes_are_visible() {
    let db = TestDatabase::new();

    let mut batch = WriteBatch::new();
    batch.put(ColumnFamily::Headers, b"h1", b"header-one");
    batch.put(ColumnFamily::Metadata, b"head", b"h1");
    batch.delete(ColumnFamily::Metadata, b"stale");
    db.write_batch(batch).unwrap();

    assert_eq!(
        db.get(ColumnFamily::Headers, b"h1").unwrap(),
        Some(b"header-one".to_vec())
    );
    assert_eq!(
        db.get(ColumnFamily::Metadata, b"head").unwrap(),
        Some(b"h1".to_vec())
    );
    assert_eq!(db.get(ColumnFamily::Metadata, b"stale").unwrap(), None);
}

#[test]
fn test_column_families_isolate_snapshot_keys() {
    let db = TestDatabase::new();
    let snap = sample_snapshot();
    snap.store(db.db()).unwrap();

    let mut key = b"posv-".to_vec();
    key.extend_from_slice(snap.hash.as_slice());
    assert!(db.contains(ColumnFamily::Snapshots, &key).unwrap());
    assert!(!db.contains(ColumnFamily::Headers, &key).unwrap());
    assert!(db.path().join("CURRENT").exists());
}
