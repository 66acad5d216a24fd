use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{BurrowError, FrameId, PageId, Result, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::page_guard::PinGuard;
use super::{Frame, LruKReplacer, PageGuard, ReadPageGuard, WritePageGuard};

/// Metadata guarded by the buffer pool latch. The page table and free list
/// always index disjoint frame sets that together cover the whole pool.
struct PoolInner {
    /// Maps resident page ids to their frames
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page
    free_list: VecDeque<FrameId>,
}

/// State shared between the manager and the guards it hands out, so that a
/// guard can return its pin after the manager itself is gone.
pub(crate) struct PoolState {
    frames: Vec<Arc<Frame>>,
    inner: Mutex<PoolInner>,
    replacer: LruKReplacer,
    disk_scheduler: DiskScheduler,
}

impl PoolState {
    /// Drops one pin on a resident page, folding in the guard's dirty flag.
    /// The frame becomes evictable when its last pin goes away. Returns
    /// false when the page is not resident or not pinned.
    pub(crate) fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];

        if is_dirty {
            frame.set_dirty(true);
        }
        match frame.unpin() {
            Some(0) => {
                self.replacer.set_evictable(frame_id, true);
                true
            }
            Some(_) => true,
            None => false,
        }
    }
}

/// BufferPoolManager arbitrates a fixed set of in-memory frames among disk
/// pages: it resolves page ids to frames, pins pages for callers, and
/// evicts cold pages through the LRU-K replacer when the pool is full.
///
/// One latch serializes all metadata changes (page table, free list, pin
/// transitions) together with any disk I/O those changes require; the
/// replacer keeps its own latch and is only ever called with the pool
/// latch already held.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<PoolState>,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames with an LRU-K replacer using
    /// the given K.
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(PoolState {
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruKReplacer::new(replacer_k, pool_size),
            disk_scheduler: DiskScheduler::new(disk_manager),
        });

        Self { pool_size, state }
    }

    /// Allocates a fresh page id, installs it in a frame, and returns a
    /// pin-only guard on it. The page starts zeroed, clean, pinned, and
    /// non-evictable.
    pub fn new_page(&self) -> Result<PageGuard> {
        let state = &self.state;
        let mut inner = state.inner.lock();

        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &state.frames[frame_id.as_usize()];

        let page_id = state.disk_scheduler.disk_manager().allocate_page();
        frame.set_page_id(page_id);
        frame.pin();

        inner.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, false);
        drop(inner);

        Ok(PageGuard::new(PinGuard::new(
            page_id,
            Arc::clone(frame),
            Arc::clone(state),
        )))
    }

    /// Fetches a page for shared access. The frame latch is taken after
    /// the pin is granted and after the pool latch is released, so a
    /// blocked latch never stalls unrelated pool traffic.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame = self.pin_page(page_id)?;
        Ok(ReadPageGuard::new(PinGuard::new(
            page_id,
            frame,
            Arc::clone(&self.state),
        )))
    }

    /// Fetches a page for exclusive access.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame = self.pin_page(page_id)?;
        Ok(WritePageGuard::new(PinGuard::new(
            page_id,
            frame,
            Arc::clone(&self.state),
        )))
    }

    /// Drops one pin on a page. See [`PoolState::unpin_page`].
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.state.unpin_page(page_id, is_dirty)
    }

    /// Writes a resident page back to disk and clears its dirty flag.
    /// Returns false when the page is not resident. Pin count and
    /// evictability are unchanged once the call completes.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(BurrowError::InvalidPageId(page_id));
        }
        let state = &self.state;

        // Pin so the frame cannot be evicted while the copy happens with
        // the pool latch released.
        let frame = {
            let inner = state.inner.lock();
            let Some(&frame_id) = inner.page_table.get(&page_id) else {
                return Ok(false);
            };
            let frame = &state.frames[frame_id.as_usize()];
            frame.pin();
            state.replacer.set_evictable(frame_id, false);
            Arc::clone(frame)
        };

        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);

        let result = state.disk_scheduler.write_sync(page_id, &data);
        if result.is_ok() {
            frame.set_dirty(false);
        }
        state.unpin_page(page_id, false);

        result.map(|()| true)
    }

    /// Flushes every currently resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let page_ids: Vec<PageId> = {
            let inner = self.state.inner.lock();
            inner.page_table.keys().copied().collect()
        };

        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Removes a page from the pool and releases its id. Returns true when
    /// the page is gone afterwards (including when it was never resident),
    /// false when it is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let state = &self.state;
        let mut inner = state.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return true;
        };
        let frame = &state.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return false;
        }

        inner.page_table.remove(&page_id);
        state.replacer.remove(frame_id);
        frame.reset();
        inner.free_list.push_back(frame_id);
        state.disk_scheduler.disk_manager().deallocate_page(page_id);

        true
    }

    /// Returns the pin count of a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.state.inner.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    /// Returns the dirty flag of a resident page.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let inner = self.state.inner.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|frame_id| self.state.frames[frame_id.as_usize()].is_dirty())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.inner.lock().free_list.len()
    }

    pub fn resident_page_count(&self) -> usize {
        self.state.inner.lock().page_table.len()
    }

    /// Number of frames the replacer currently considers evictable.
    pub fn evictable_frame_count(&self) -> usize {
        self.state.replacer.size()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.state.disk_scheduler.disk_manager()
    }

    /// Resolves a page id to a pinned frame, reading the page from disk on
    /// a miss.
    fn pin_page(&self, page_id: PageId) -> Result<Arc<Frame>> {
        if page_id == INVALID_PAGE_ID {
            return Err(BurrowError::InvalidPageId(page_id));
        }
        let state = &self.state;
        let mut inner = state.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &state.frames[frame_id.as_usize()];
            frame.pin();
            state.replacer.record_access(frame_id);
            state.replacer.set_evictable(frame_id, false);
            return Ok(Arc::clone(frame));
        }

        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &state.frames[frame_id.as_usize()];

        let data = match state.disk_scheduler.read_sync(page_id) {
            Ok(data) => data,
            Err(e) => {
                // Keep frame accounting intact on a failed read.
                inner.free_list.push_front(frame_id);
                return Err(e);
            }
        };
        frame.load(page_id, &data[..]);
        frame.pin();

        inner.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, false);

        Ok(Arc::clone(frame))
    }

    /// Frame selection for the miss path: free list first, then an LRU-K
    /// victim. A dirty victim is written back before its frame is reused;
    /// the reused frame comes back zeroed.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.state.replacer.evict() else {
            return Err(BurrowError::PoolExhausted);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        let victim_page_id = frame.page_id();

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            if let Err(e) = self.state.disk_scheduler.write_sync(victim_page_id, &data) {
                // Re-register the victim so the pool stays consistent.
                self.state.replacer.record_access(frame_id);
                self.state.replacer.set_evictable(frame_id, true);
                return Err(e);
            }
        }

        inner.page_table.remove(&victim_page_id);
        frame.reset();

        Ok(frame_id)
    }
}
