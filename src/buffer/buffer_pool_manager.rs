use std::collections::{HashMap, LinkedList};
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, StrataError, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::page_guard::ReleaseCallback;
use super::{AccessType, FrameHeader, LruKReplacer, PageGuard, ReadPageGuard, WritePageGuard};

/// Bookkeeping behind the pool latch. Holding this mutex for the full
/// duration of every public operation (including awaited disk I/O) is
/// deliberate: one lock, simple reasoning. Per-page latches live in the
/// frames and are only taken by guards after this lock is released.
struct PoolInner {
    /// Page table: maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Frames not currently holding any page
    free_list: LinkedList<FrameId>,
}

/// State shared between the pool and the guards it hands out
struct BufferPoolState {
    /// The buffer pool frames
    frames: Vec<Arc<FrameHeader>>,
    /// The pool latch
    inner: Mutex<PoolInner>,
    /// LRU-K replacer for eviction decisions; has its own internal lock
    replacer: LruKReplacer,
}

/// BufferPoolManager mediates all page I/O between the disk manager and
/// higher layers. It owns a fixed array of frames, caches pages in them,
/// and evicts with the LRU-K policy when every frame is occupied.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// Shared state
    state: Arc<BufferPoolState>,
    /// Disk scheduler for page I/O
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size, k value
    /// for LRU-K, and disk manager.
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = LinkedList::new();

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(BufferPoolState {
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruKReplacer::new(k, pool_size),
        });

        Self {
            pool_size,
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Creates a new page in the buffer pool, pinned once.
    /// The caller owns the pin and must hand it back with `unpin_page`
    /// (or use `new_page_guarded`, which transfers it to a guard).
    pub fn new_page(&self) -> Result<PageId> {
        let mut inner = self.state.inner.lock();
        let (page_id, _) = self.create_page(&mut inner)?;
        Ok(page_id)
    }

    /// Creates a new page and returns a basic guard owning its pin.
    pub fn new_page_guarded(&self) -> Result<PageGuard> {
        let frame = {
            let mut inner = self.state.inner.lock();
            let (_, frame_id) = self.create_page(&mut inner)?;
            Arc::clone(&self.state.frames[frame_id.as_usize()])
        };
        Ok(PageGuard::new(
            frame.page_id(),
            frame,
            self.release_callback(),
        ))
    }

    /// Pins a page without taking a page latch and returns a basic
    /// guard, upgradeable to read or write access.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<PageGuard> {
        let frame_id = self.fetch_frame(page_id, AccessType::Unknown)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(PageGuard::new(page_id, frame, self.release_callback()))
    }

    /// Fetches a page for shared read access.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_frame(page_id, AccessType::Unknown)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        // Safety: the callback and frame both live inside the pool's
        // shared state, which guards keep alive via Arc.
        Ok(unsafe { ReadPageGuard::new(page_id, frame, self.release_callback()) })
    }

    /// Fetches a page for exclusive write access.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_frame(page_id, AccessType::Unknown)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        // Safety: as in fetch_page_read.
        Ok(unsafe { WritePageGuard::new(page_id, frame, self.release_callback()) })
    }

    /// Hands a pin back to the pool. Returns false when the page is not
    /// resident or was not pinned. The dirty flag only ever sticks on.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.state.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        match frame.unpin() {
            None => false,
            Some(remaining) => {
                if is_dirty {
                    frame.set_dirty(true);
                }
                if remaining == 0 {
                    let _ = self.state.replacer.set_evictable(frame_id, true);
                }
                true
            }
        }
    }

    /// Writes a page's buffer to disk, dirty or not, and clears the
    /// dirty flag. Returns false when the page is not resident. Pin
    /// state is untouched.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(StrataError::InvalidPageId(page_id));
        }

        let inner = self.state.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            self.flush_frame(frame_id, page_id)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Flushes every resident page to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let inner = self.state.inner.lock();

        for (&page_id, &frame_id) in inner.page_table.iter() {
            self.flush_frame(frame_id, page_id)?;
        }

        Ok(())
    }

    /// Drops a page from the buffer pool and retires its id.
    /// A non-resident page deletes trivially; a pinned page refuses.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.state.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(true);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        if frame.pin_count() > 0 {
            return Ok(false);
        }

        inner.page_table.remove(&page_id);
        self.state.replacer.remove(frame_id)?;
        frame.reset();
        inner.free_list.push_back(frame_id);

        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;

        debug!("deleted {} from {}", page_id, frame_id);
        Ok(true)
    }

    /// Returns the pin count for a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.state.inner.lock();

        inner
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.state.inner.lock().free_list.len()
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Installs a fresh page in a free frame: pin count 1, zeroed
    /// buffer, access recorded, not evictable.
    fn create_page(&self, inner: &mut PoolInner) -> Result<(PageId, FrameId)> {
        let frame_id = self.acquire_frame(inner)?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let page_id = self.disk_scheduler.disk_manager().allocate_page()?;

        frame.reset();
        frame.set_page_id(page_id);
        frame.pin();

        inner.page_table.insert(page_id, frame_id);
        self.state
            .replacer
            .record_access(frame_id, AccessType::Unknown)?;
        self.state.replacer.set_evictable(frame_id, false)?;

        debug!("allocated {} in {}", page_id, frame_id);
        Ok((page_id, frame_id))
    }

    /// Pins the frame holding `page_id`, reading the page in through the
    /// scheduler if it is not resident.
    fn fetch_frame(&self, page_id: PageId, access_type: AccessType) -> Result<FrameId> {
        if page_id == INVALID_PAGE_ID {
            return Err(StrataError::InvalidPageId(page_id));
        }

        let mut inner = self.state.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.pin();
            self.state.replacer.record_access(frame_id, access_type)?;
            self.state.replacer.set_evictable(frame_id, false)?;
            trace!("pool hit for {}", page_id);
            return Ok(frame_id);
        }

        debug!("pool miss for {}, loading from disk", page_id);
        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        self.disk_scheduler.schedule_read_sync(page_id, &mut data)?;

        frame.set_page_id(page_id);
        frame.fill_from(&data);
        frame.set_dirty(false);
        frame.pin();

        inner.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id, access_type)?;
        self.state.replacer.set_evictable(frame_id, false)?;

        Ok(frame_id)
    }

    /// Produces an empty frame: free list first, otherwise evict.
    /// Dirty victims are written back before the frame is reused.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self
            .state
            .replacer
            .evict()
            .ok_or(StrataError::BufferPoolFull)?;
        let frame = &self.state.frames[frame_id.as_usize()];
        let victim_page_id = frame.page_id();

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_into(&mut data);
            self.disk_scheduler
                .schedule_write_sync(victim_page_id, &data)?;
        }

        inner.page_table.remove(&victim_page_id);
        frame.reset();

        trace!("evicted {} from {}", victim_page_id, frame_id);
        Ok(frame_id)
    }

    fn flush_frame(&self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        frame.copy_into(&mut data);

        self.disk_scheduler.schedule_write_sync(page_id, &data)?;
        frame.set_dirty(false);
        Ok(())
    }

    /// Builds the unpin callback a guard runs when it drops. The guard
    /// has already released any page latch by the time this runs.
    fn release_callback(&self) -> ReleaseCallback {
        let state = Arc::clone(&self.state);
        Box::new(move |page_id, is_dirty| {
            let inner = state.inner.lock();
            if let Some(&frame_id) = inner.page_table.get(&page_id) {
                let frame = &state.frames[frame_id.as_usize()];
                if is_dirty {
                    frame.set_dirty(true);
                }
                if let Some(0) = frame.unpin() {
                    let _ = state.replacer.set_evictable(frame_id, true);
                }
            }
        })
    }
}
