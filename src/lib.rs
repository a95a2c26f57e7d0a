//! Strata - the storage core of an educational disk-oriented DBMS
//!
//! The crate provides the pieces a disk-oriented database engine stands
//! on: pages are cached in a fixed pool of frames, evicted by LRU-K,
//! accessed through scoped guards, and indexed by a disk-resident
//! extendible hash table.
//!
//! # Architecture
//!
//! - **Storage layer** (`storage`): disk I/O
//!   - `DiskManager`: reads and writes fixed-size pages in a database file
//!   - `DiskScheduler`: FIFO request queue drained by one worker thread
//!
//! - **Buffer pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: caches pages in frames, evicting with LRU-K
//!   - `LruKReplacer`: backward-k-distance victim selection
//!   - `FrameHeader`: per-frame pin count, dirty flag, and page latch
//!   - `PageGuard`/`ReadPageGuard`/`WritePageGuard`: scoped pin and
//!     latch handles; dropping a guard releases both
//!
//! - **Index** (`index`): `DiskExtendibleHashTable`, a three-level
//!   (header, directory, bucket) hash index generic over key, value,
//!   comparator, and hash function
//!
//! - **Trie** (`trie`): an in-memory persistent copy-on-write prefix
//!   tree with typed values
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::buffer::BufferPoolManager;
//! use strata::index::{DiskExtendibleHashTable, FxKeyHasher, OrdComparator};
//! use strata::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
//!
//! let table: DiskExtendibleHashTable<u32, u64, _, _> = DiskExtendibleHashTable::new(
//!     "numbers",
//!     Arc::clone(&bpm),
//!     OrdComparator::new(),
//!     FxKeyHasher,
//!     2, // header depth
//!     9, // directory depth
//!     64, // bucket capacity
//! )
//! .unwrap();
//!
//! table.insert(&7, &700).unwrap();
//! assert_eq!(table.get_value(&7).unwrap(), Some(700));
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;
pub mod trie;

// Re-export commonly used types at the crate root
pub use common::{PageId, RecordId, Result, SlotId, StrataError};
