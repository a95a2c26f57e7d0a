use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::FrameHeader;

/// Callback invoked exactly once when a guard releases its pin
pub(crate) type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// State shared by all three guard kinds: the pin on the frame and the
/// release callback that gives it back to the pool.
struct GuardCore {
    /// The page ID being guarded
    page_id: PageId,
    /// Keeps the frame (and its buffer) alive for the guard's lifetime
    frame: Arc<FrameHeader>,
    /// Unpin callback; taken exactly once
    release_callback: Option<ReleaseCallback>,
    /// Whether this guard dirtied the page
    is_dirty: bool,
}

impl GuardCore {
    fn new(page_id: PageId, frame: Arc<FrameHeader>, release_callback: ReleaseCallback) -> Self {
        Self {
            page_id,
            frame,
            release_callback: Some(release_callback),
            is_dirty: false,
        }
    }

    /// Moves the core out of a guard that is being consumed by an
    /// upgrade, leaving the source guard inert.
    fn take(&mut self) -> Self {
        Self {
            page_id: self.page_id,
            frame: Arc::clone(&self.frame),
            release_callback: self.release_callback.take(),
            is_dirty: self.is_dirty,
        }
    }

    fn release(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback(self.page_id, self.is_dirty);
        }
    }
}

/// Scoped handle on a pinned page without a page latch.
/// Dropping it unpins; upgrading takes the shared or exclusive latch
/// without touching the pin.
pub struct PageGuard {
    core: GuardCore,
}

impl PageGuard {
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self {
            core: GuardCore::new(page_id, frame, release_callback),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.core.page_id
    }

    /// Takes the shared page latch, consuming this guard.
    /// The pin transfers to the returned guard.
    pub fn upgrade_read(mut self) -> ReadPageGuard {
        let core = self.core.take();
        ReadPageGuard::from_core(core)
    }

    /// Takes the exclusive page latch, consuming this guard.
    /// The pin transfers to the returned guard.
    pub fn upgrade_write(mut self) -> WritePageGuard {
        let core = self.core.take();
        WritePageGuard::from_core(core)
    }

    /// Drops this guard, releasing the pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.core.release();
    }
}

/// RAII guard for shared read access to a page.
/// Releases the read latch, then the pin, when dropped.
pub struct ReadPageGuard {
    core: GuardCore,
    /// Read latch on the page buffer; taken before the core is released
    latch: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// # Safety
    /// The callback must keep working for as long as the pool that
    /// produced it is alive, and the guard must not outlive the pool.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self::from_core(GuardCore::new(page_id, frame, release_callback))
    }

    fn from_core(core: GuardCore) -> Self {
        let latch = core.frame.latch_read();
        // The latch borrows the frame, which the core keeps alive via
        // Arc for the guard's whole lifetime, so extending the borrow
        // to 'static is sound.
        let latch: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            unsafe { std::mem::transmute(latch) };

        Self {
            core,
            latch: Some(latch),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.core.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.latch.as_ref().unwrap()[..]
    }

    /// Drops this guard, releasing the latch and the pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Latch first, pin second: the release callback must never run
        // while a page latch is held.
        self.latch.take();
        self.core.release();
    }
}

/// RAII guard for exclusive write access to a page.
/// Mutable access marks the page dirty; dropping releases the write
/// latch and then the pin.
pub struct WritePageGuard {
    core: GuardCore,
    latch: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    /// # Safety
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self::from_core(GuardCore::new(page_id, frame, release_callback))
    }

    fn from_core(core: GuardCore) -> Self {
        let latch = core.frame.latch_write();
        // Sound for the same reason as the read guard: the core's Arc
        // outlives the latch.
        let latch: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            unsafe { std::mem::transmute(latch) };

        Self {
            core,
            latch: Some(latch),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.core.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.latch.as_ref().unwrap()[..]
    }

    /// Mutable view of the page buffer; marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.core.is_dirty = true;
        &mut self.latch.as_mut().unwrap()[..]
    }

    /// Drops this guard, releasing the latch and the pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.latch.take();
        self.core.release();
    }
}
