//! Integration tests for the disk-resident extendible hash table

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata::buffer::BufferPoolManager;
use strata::common::RecordId;
use strata::index::{
    DiskExtendibleHashTable, FxKeyHasher, IdentityKeyHasher, OrdComparator,
};
use strata::storage::disk::DiskManager;
use strata::{PageId, SlotId};
use tempfile::NamedTempFile;

type IdentityTable = DiskExtendibleHashTable<u32, u64, OrdComparator<u32>, IdentityKeyHasher>;
type RidTable = DiskExtendibleHashTable<u64, RecordId, OrdComparator<u64>, FxKeyHasher>;

fn create_identity_table(
    pool_size: usize,
    header_depth: u32,
    directory_depth: u32,
    bucket_size: u32,
) -> (IdentityTable, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, 2, dm));
    let table = IdentityTable::new(
        "identity",
        bpm,
        OrdComparator::new(),
        IdentityKeyHasher,
        header_depth,
        directory_depth,
        bucket_size,
    )
    .unwrap();
    (table, temp_file)
}

#[test]
fn test_hash_table_single_split_then_merge_back() {
    let (table, _temp) = create_identity_table(16, 0, 9, 4);

    // Keys 1..=5 overflow the single depth-0 bucket exactly once.
    for key in 1..=5u32 {
        assert!(table.insert(&key, &(key as u64 * 100)).unwrap());
    }
    assert_eq!(table.directory_global_depth(0).unwrap(), Some(1));

    for key in 1..=5u32 {
        assert_eq!(table.get_value(&key).unwrap(), Some(key as u64 * 100));
    }

    // Removing the first four leaves one entry and the directory folds
    // back to depth 0.
    for key in 1..=4u32 {
        assert!(table.remove(&key).unwrap());
        assert_eq!(table.get_value(&key).unwrap(), None);
    }
    assert_eq!(table.get_value(&5).unwrap(), Some(500));
    assert_eq!(table.directory_global_depth(0).unwrap(), Some(0));
}

#[test]
fn test_hash_table_duplicate_insert_does_not_split() {
    let (table, _temp) = create_identity_table(16, 0, 9, 4);

    // Fill one bucket exactly.
    for key in [0u32, 2, 4, 6] {
        assert!(table.insert(&key, &1).unwrap());
    }
    assert_eq!(table.directory_global_depth(0).unwrap(), Some(0));

    // A duplicate against a full bucket is rejected without splitting.
    assert!(!table.insert(&4, &999).unwrap());
    assert_eq!(table.directory_global_depth(0).unwrap(), Some(0));
    assert_eq!(table.get_value(&4).unwrap(), Some(1));
}

#[test]
fn test_hash_table_grows_through_many_splits() {
    let (table, _temp) = create_identity_table(64, 0, 9, 4);

    let count = 256u32;
    for key in 0..count {
        assert!(table.insert(&key, &(key as u64)).unwrap(), "key {}", key);
    }
    for key in 0..count {
        assert_eq!(table.get_value(&key).unwrap(), Some(key as u64));
    }
    assert_eq!(table.get_value(&count).unwrap(), None);

    // 256 identity-hashed keys in buckets of 4 need depth 6.
    assert_eq!(table.directory_global_depth(0).unwrap(), Some(6));
}

#[test]
fn test_hash_table_removing_everything_shrinks_to_zero() {
    let (table, _temp) = create_identity_table(64, 0, 9, 4);

    for key in 0..64u32 {
        table.insert(&key, &(key as u64)).unwrap();
    }
    assert!(table.directory_global_depth(0).unwrap().unwrap() > 0);

    for key in 0..64u32 {
        assert!(table.remove(&key).unwrap());
    }
    for key in 0..64u32 {
        assert_eq!(table.get_value(&key).unwrap(), None);
    }
    assert_eq!(table.directory_global_depth(0).unwrap(), Some(0));
}

#[test]
fn test_hash_table_header_routing_across_directories() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(32, 2, dm));
    // Two header bits: four directories, selected by the hash's top bits.
    let table = IdentityTable::new(
        "routed",
        bpm,
        OrdComparator::new(),
        IdentityKeyHasher,
        2,
        9,
        4,
    )
    .unwrap();

    // One key per header quadrant.
    let keys = [0x00000001u32, 0x40000002, 0x80000003, 0xC0000004];
    for &key in &keys {
        assert!(table.insert(&key, &(key as u64)).unwrap());
    }
    for &key in &keys {
        assert_eq!(table.get_value(&key).unwrap(), Some(key as u64));
    }

    // Each quadrant lazily created its own directory.
    for idx in 0..4 {
        assert_eq!(table.directory_global_depth(idx).unwrap(), Some(0));
    }
}

#[test]
fn test_hash_table_randomized_against_model() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(64, 2, dm));
    let table = RidTable::new(
        "model",
        bpm,
        OrdComparator::new(),
        FxKeyHasher,
        1,
        9,
        8,
    )
    .unwrap();

    let mut model: HashMap<u64, RecordId> = HashMap::new();
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);

    for _ in 0..2000 {
        let key = rng.gen_range(0..500u64);
        if rng.gen_bool(0.6) {
            let value = RecordId::new(PageId::new(key as u32), SlotId::new(rng.gen()));
            let inserted = table.insert(&key, &value).unwrap();
            assert_eq!(inserted, !model.contains_key(&key), "insert key {}", key);
            model.entry(key).or_insert(value);
        } else {
            let removed = table.remove(&key).unwrap();
            assert_eq!(removed, model.remove(&key).is_some(), "remove key {}", key);
        }
    }

    for (key, value) in &model {
        assert_eq!(table.get_value(key).unwrap(), Some(*value));
    }
    for key in 500..520u64 {
        assert_eq!(table.get_value(&key).unwrap(), None);
    }
}

#[test]
fn test_hash_table_local_depth_routing_invariant() {
    // After a burst of inserts, every key must still be reachable via
    // the directory slot its hash selects, which is the observable form
    // of the local-depth invariant.
    let (table, _temp) = create_identity_table(64, 0, 9, 2);

    let keys: Vec<u32> = (0..48).map(|i| i * 3).collect();
    for key in &keys {
        assert!(table.insert(key, &(*key as u64)).unwrap());
    }
    for key in &keys {
        assert_eq!(table.get_value(key).unwrap(), Some(*key as u64));
    }
}
