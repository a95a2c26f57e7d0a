use std::sync::Arc;

use strata::buffer::BufferPoolManager;
use strata::index::{DiskExtendibleHashTable, FxKeyHasher, OrdComparator};
use strata::storage::disk::DiskManager;
use strata::trie::Trie;

fn main() {
    println!("Strata - storage engine core walkthrough");
    println!("========================================\n");

    let db_path = "demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("Failed to create disk manager"));
    println!("Created disk manager for: {}", db_path);

    let bpm = Arc::new(BufferPoolManager::new(16, 2, disk_manager));
    println!("Created buffer pool manager with 16 frames\n");

    // A hash index over u32 keys and u64 values.
    let table: DiskExtendibleHashTable<u32, u64, _, _> = DiskExtendibleHashTable::new(
        "demo_index",
        Arc::clone(&bpm),
        OrdComparator::new(),
        FxKeyHasher,
        1,
        9,
        16,
    )
    .expect("Failed to create hash table");

    for key in 0..100u32 {
        table
            .insert(&key, &(key as u64 * key as u64))
            .expect("insert failed");
    }
    println!("Inserted 100 keys into the hash index");

    let sample = table.get_value(&17).expect("lookup failed");
    println!("get_value(17) = {:?}", sample);

    for key in 0..50u32 {
        table.remove(&key).expect("remove failed");
    }
    println!(
        "Removed 50 keys; get_value(17) = {:?}, get_value(83) = {:?}\n",
        table.get_value(&17).expect("lookup failed"),
        table.get_value(&83).expect("lookup failed")
    );

    bpm.flush_all_pages().expect("flush failed");
    println!("Flushed all pages to {}", db_path);

    // The persistent trie: every mutation is a new version.
    let v1 = Trie::new().put(b"alpha", 1u32).put(b"beta", 2u32);
    let v2 = v1.put(b"alpha", 10u32).remove(b"beta");

    println!("\nTrie versions share structure:");
    println!(
        "  v1: alpha={:?} beta={:?}",
        v1.get::<u32>(b"alpha"),
        v1.get::<u32>(b"beta")
    );
    println!(
        "  v2: alpha={:?} beta={:?}",
        v2.get::<u32>(b"alpha"),
        v2.get::<u32>(b"beta")
    );
}
