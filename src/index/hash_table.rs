use std::marker::PhantomData;
use std::sync::Arc;

use log::{debug, trace};

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{PageId, Result, INVALID_PAGE_ID};

use super::bucket_page::bucket_max_capacity;
use super::{
    BucketPage, BucketPageRef, DirectoryPage, DirectoryPageRef, HeaderPage, HeaderPageRef,
    KeyComparator, KeyHasher, Storable,
};

/// Disk-resident extendible hash table, three page levels deep:
/// header -> directory -> bucket. The buffer pool is its only
/// persistence mechanism; pages are only ever touched through guards,
/// released parent-before-child as soon as their contents have been
/// extracted.
pub struct DiskExtendibleHashTable<K, V, C, H> {
    name: String,
    bpm: Arc<BufferPoolManager>,
    cmp: C,
    hasher: H,
    directory_max_depth: u32,
    bucket_max_size: u32,
    header_page_id: PageId,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, C, H> DiskExtendibleHashTable<K, V, C, H>
where
    K: Storable,
    V: Storable,
    C: KeyComparator<K>,
    H: KeyHasher<K>,
{
    /// Creates a new hash table, allocating and initializing its header
    /// page.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        bpm: Arc<BufferPoolManager>,
        cmp: C,
        hasher: H,
        header_max_depth: u32,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Result<Self> {
        assert!(
            bucket_max_size <= bucket_max_capacity::<K, V>(),
            "bucket size {} does not fit in a page",
            bucket_max_size
        );

        let basic = bpm.new_page_guarded()?;
        let header_page_id = basic.page_id();
        let mut header_guard = basic.upgrade_write();
        HeaderPage::new(header_guard.data_mut()).init(header_max_depth);
        drop(header_guard);

        debug!("created hash table {:?} with header {}", name, header_page_id);

        Ok(Self {
            name: name.to_string(),
            bpm,
            cmp,
            hasher,
            directory_max_depth,
            bucket_max_size,
            header_page_id,
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    /// Looks up the value stored under `key`. Read guards only, each
    /// released before its child is taken.
    pub fn get_value(&self, key: &K) -> Result<Option<V>> {
        let hash = self.hasher.hash_key(key);

        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let directory_page_id = {
            let header = HeaderPageRef::new(header_guard.data());
            let directory_idx = header.hash_to_directory_index(hash);
            header.directory_page_id(directory_idx)
        };
        drop(header_guard);

        if directory_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let directory_guard = self.bpm.fetch_page_read(directory_page_id)?;
        let bucket_page_id = {
            let directory = DirectoryPageRef::new(directory_guard.data());
            let bucket_idx = directory.hash_to_bucket_index(hash);
            directory.bucket_page_id(bucket_idx)
        };
        drop(directory_guard);

        if bucket_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let bucket_guard = self.bpm.fetch_page_read(bucket_page_id)?;
        let bucket = BucketPageRef::<K, V>::new(bucket_guard.data());
        Ok(bucket.lookup(key, &self.cmp))
    }

    /// Inserts a key/value pair. Returns false on a duplicate key, or
    /// when the target bucket is full and cannot split any further.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        let hash = self.hasher.hash_key(key);

        let mut header_guard = self.bpm.fetch_page_write(self.header_page_id)?;
        let (directory_idx, directory_page_id) = {
            let header = HeaderPageRef::new(header_guard.data());
            let directory_idx = header.hash_to_directory_index(hash);
            (directory_idx, header.directory_page_id(directory_idx))
        };

        if directory_page_id == INVALID_PAGE_ID {
            return self.insert_into_new_directory(&mut header_guard, directory_idx, hash, key, value);
        }
        drop(header_guard);

        self.insert_into_directory(directory_page_id, hash, key, value)
    }

    /// Removes `key`. An emptied bucket merges with its split image
    /// while possible, and the directory shrinks while no bucket still
    /// needs its full depth.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let hash = self.hasher.hash_key(key);

        let header_guard = self.bpm.fetch_page_write(self.header_page_id)?;
        let directory_page_id = {
            let header = HeaderPageRef::new(header_guard.data());
            let directory_idx = header.hash_to_directory_index(hash);
            header.directory_page_id(directory_idx)
        };
        drop(header_guard);

        if directory_page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;
        let (bucket_idx, bucket_page_id) = {
            let directory = DirectoryPageRef::new(directory_guard.data());
            let bucket_idx = directory.hash_to_bucket_index(hash);
            (bucket_idx, directory.bucket_page_id(bucket_idx))
        };

        if bucket_page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let (removed, emptied) = {
            let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
            let mut bucket = BucketPage::<K, V>::new(bucket_guard.data_mut());
            let removed = bucket.remove(key, &self.cmp);
            (removed, bucket.is_empty())
        };

        if !removed {
            return Ok(false);
        }

        if emptied {
            self.merge_bucket(&mut directory_guard, bucket_idx)?;
        }

        let mut directory = DirectoryPage::new(directory_guard.data_mut());
        while directory.can_shrink() {
            directory.decr_global_depth();
        }

        Ok(true)
    }

    /// Reads the global depth of the directory behind `directory_idx`,
    /// or None when no directory has been created for that slot yet.
    /// Exposed so tests can observe grow/shrink behavior.
    pub fn directory_global_depth(&self, directory_idx: u32) -> Result<Option<u32>> {
        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let directory_page_id =
            HeaderPageRef::new(header_guard.data()).directory_page_id(directory_idx);
        drop(header_guard);

        if directory_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let directory_guard = self.bpm.fetch_page_read(directory_page_id)?;
        Ok(Some(
            DirectoryPageRef::new(directory_guard.data()).global_depth(),
        ))
    }

    /// First insert routed through a header slot: allocates the
    /// directory page, installs it, and seeds its first bucket.
    fn insert_into_new_directory(
        &self,
        header_guard: &mut WritePageGuard,
        directory_idx: u32,
        hash: u32,
        key: &K,
        value: &V,
    ) -> Result<bool> {
        let basic = self.bpm.new_page_guarded()?;
        let directory_page_id = basic.page_id();
        let mut directory_guard = basic.upgrade_write();
        let mut directory = DirectoryPage::new(directory_guard.data_mut());
        directory.init(self.directory_max_depth);

        HeaderPage::new(header_guard.data_mut()).set_directory_page_id(directory_idx, directory_page_id);
        debug!(
            "{}: new directory {} for header slot {}",
            self.name, directory_page_id, directory_idx
        );

        let bucket_idx = directory.hash_to_bucket_index(hash);
        self.insert_into_new_bucket(&mut directory, bucket_idx, key, value)
    }

    /// Allocates a bucket page for a directory slot that has none and
    /// performs the pending insert into it.
    fn insert_into_new_bucket(
        &self,
        directory: &mut DirectoryPage<'_>,
        bucket_idx: u32,
        key: &K,
        value: &V,
    ) -> Result<bool> {
        let basic = self.bpm.new_page_guarded()?;
        let bucket_page_id = basic.page_id();
        let mut bucket_guard = basic.upgrade_write();
        let mut bucket = BucketPage::<K, V>::new(bucket_guard.data_mut());
        bucket.init(self.bucket_max_size);

        directory.set_bucket_page_id(bucket_idx, bucket_page_id);

        Ok(bucket.insert(key, value, &self.cmp))
    }

    /// The write path once a directory exists: insert, or split the
    /// full target bucket and retry. Each split raises one local depth,
    /// so the loop is bounded by `directory_max_depth`.
    fn insert_into_directory(
        &self,
        directory_page_id: PageId,
        hash: u32,
        key: &K,
        value: &V,
    ) -> Result<bool> {
        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;

        loop {
            let (bucket_idx, bucket_page_id) = {
                let directory = DirectoryPageRef::new(directory_guard.data());
                let bucket_idx = directory.hash_to_bucket_index(hash);
                (bucket_idx, directory.bucket_page_id(bucket_idx))
            };

            if bucket_page_id == INVALID_PAGE_ID {
                let mut directory = DirectoryPage::new(directory_guard.data_mut());
                return self.insert_into_new_bucket(&mut directory, bucket_idx, key, value);
            }

            let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
            {
                let mut bucket = BucketPage::<K, V>::new(bucket_guard.data_mut());
                if !bucket.is_full() {
                    return Ok(bucket.insert(key, value, &self.cmp));
                }
                // Duplicates must not trigger a split.
                if bucket.lookup(key, &self.cmp).is_some() {
                    return Ok(false);
                }
            }

            let (local_depth, global_depth) = {
                let directory = DirectoryPageRef::new(directory_guard.data());
                (directory.local_depth(bucket_idx), directory.global_depth())
            };

            if local_depth >= self.directory_max_depth {
                debug!(
                    "{}: insert rejected, bucket {} already at max depth {}",
                    self.name, bucket_page_id, local_depth
                );
                return Ok(false);
            }

            if local_depth == global_depth {
                DirectoryPage::new(directory_guard.data_mut()).incr_global_depth();
            }

            self.split_bucket(&mut directory_guard, &mut bucket_guard, bucket_idx)?;
        }
    }

    /// Splits the full bucket at `bucket_idx`: raises its local depth,
    /// allocates its split image, remaps every aliasing directory slot
    /// against the new depth, and redistributes entries by rehash.
    fn split_bucket(
        &self,
        directory_guard: &mut WritePageGuard,
        bucket_guard: &mut WritePageGuard,
        bucket_idx: u32,
    ) -> Result<()> {
        let old_page_id = bucket_guard.page_id();

        let basic = self.bpm.new_page_guarded()?;
        let new_page_id = basic.page_id();
        let mut new_guard = basic.upgrade_write();
        let mut new_bucket = BucketPage::<K, V>::new(new_guard.data_mut());
        new_bucket.init(self.bucket_max_size);

        let mut directory = DirectoryPage::new(directory_guard.data_mut());
        directory.incr_local_depth(bucket_idx);
        let new_local_depth = directory.local_depth(bucket_idx);
        let split_image_idx = directory.split_image_index(bucket_idx);
        let mask = (1u32 << new_local_depth) - 1;

        trace!(
            "{}: splitting bucket {} (idx {}) at depth {}, image {} -> {}",
            self.name,
            old_page_id,
            bucket_idx,
            new_local_depth,
            split_image_idx,
            new_page_id
        );

        // Every slot still aliasing the old bucket adopts the new
        // depth; the half matching the split image moves to the new
        // page.
        for i in 0..directory.size() {
            if directory.bucket_page_id(i) == old_page_id {
                directory.set_local_depth(i, new_local_depth);
                if i & mask == split_image_idx & mask {
                    directory.set_bucket_page_id(i, new_page_id);
                }
            }
        }

        // Rehash the old bucket's entries under the updated mapping.
        // Reverse order so the swap-with-last removal never disturbs an
        // entry that has yet to be visited.
        let mut old_bucket = BucketPage::<K, V>::new(bucket_guard.data_mut());
        let mut i = old_bucket.size();
        while i > 0 {
            i -= 1;
            let (entry_key, entry_value) = old_bucket.entry_at(i);
            let target_idx = directory.hash_to_bucket_index(self.hasher.hash_key(&entry_key));
            if directory.bucket_page_id(target_idx) != old_page_id {
                old_bucket.remove_at(i);
                new_bucket.insert(&entry_key, &entry_value, &self.cmp);
            }
        }

        Ok(())
    }

    /// Merges the emptied bucket at `bucket_idx` with its split image,
    /// propagating while the surviving bucket is itself empty and a
    /// valid equal-depth peer exists.
    fn merge_bucket(
        &self,
        directory_guard: &mut WritePageGuard,
        mut bucket_idx: u32,
    ) -> Result<()> {
        loop {
            let (local_depth, bucket_page_id, split_idx, split_page_id) = {
                let directory = DirectoryPageRef::new(directory_guard.data());
                let local_depth = directory.local_depth(bucket_idx);
                if local_depth == 0 {
                    return Ok(());
                }
                let split_idx = bucket_idx ^ (1 << (local_depth - 1));
                let split_page_id = directory.bucket_page_id(split_idx);
                if split_page_id == INVALID_PAGE_ID
                    || directory.local_depth(split_idx) != local_depth
                {
                    return Ok(());
                }
                (
                    local_depth,
                    directory.bucket_page_id(bucket_idx),
                    split_idx,
                    split_page_id,
                )
            };

            {
                let mut directory = DirectoryPage::new(directory_guard.data_mut());
                for i in 0..directory.size() {
                    let page_id = directory.bucket_page_id(i);
                    if page_id == bucket_page_id || page_id == split_page_id {
                        directory.set_bucket_page_id(i, split_page_id);
                        directory.set_local_depth(i, local_depth - 1);
                    }
                }
            }

            self.bpm.delete_page(bucket_page_id)?;
            trace!(
                "{}: merged empty bucket {} into {}",
                self.name,
                bucket_page_id,
                split_page_id
            );

            let survivor_empty = {
                let guard = self.bpm.fetch_page_read(split_page_id)?;
                BucketPageRef::<K, V>::new(guard.data()).is_empty()
            };
            if !survivor_empty {
                return Ok(());
            }

            // Canonical index of the survivor at its reduced depth.
            bucket_idx = split_idx & ((1 << (local_depth - 1)) - 1);
        }
    }
}
