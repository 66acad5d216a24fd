use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::PoolState;
use super::Frame;

/// The core every guard variant is built on: a single pin on a resident
/// page. Dropping it returns the pin (and the accumulated dirty flag) to
/// the buffer pool, which makes the frame evictable again once the last
/// pin is gone.
pub(crate) struct PinGuard {
    page_id: PageId,
    pub(crate) frame: Arc<Frame>,
    pool: Arc<PoolState>,
    mark_dirty: bool,
}

impl PinGuard {
    pub(crate) fn new(page_id: PageId, frame: Arc<Frame>, pool: Arc<PoolState>) -> Self {
        Self {
            page_id,
            frame,
            pool,
            mark_dirty: false,
        }
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.mark_dirty);
    }
}

/// Extends the page-latch guard's lifetime to 'static so it can live in a
/// struct next to the Arc that keeps the frame alive.
///
/// # Safety
/// The caller must store the returned guard alongside an `Arc<Frame>`
/// (dropped after the guard) so the lock outlives no frame.
unsafe fn read_latch_static(
    frame: &Arc<Frame>,
) -> RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> {
    std::mem::transmute::<RwLockReadGuard<'_, _>, RwLockReadGuard<'static, _>>(frame.data.read())
}

unsafe fn write_latch_static(
    frame: &Arc<Frame>,
) -> RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> {
    std::mem::transmute::<RwLockWriteGuard<'_, _>, RwLockWriteGuard<'static, _>>(frame.data.write())
}

/// Pin-only guard handed out by `BufferPoolManager::new_page`. It keeps
/// the page resident without touching its bytes; upgrade it to a read or
/// write guard for access.
pub struct PageGuard {
    pin: PinGuard,
}

impl PageGuard {
    pub(crate) fn new(pin: PinGuard) -> Self {
        Self { pin }
    }

    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    /// Trades the bare pin for a shared latch on the page contents.
    pub fn upgrade_read(self) -> ReadPageGuard {
        let data = unsafe { read_latch_static(&self.pin.frame) };
        ReadPageGuard {
            data,
            pin: self.pin,
        }
    }

    /// Trades the bare pin for an exclusive latch on the page contents.
    pub fn upgrade_write(self) -> WritePageGuard {
        let data = unsafe { write_latch_static(&self.pin.frame) };
        WritePageGuard {
            data,
            pin: self.pin,
        }
    }
}

/// RAII guard for shared access to a page. Holds a pin plus the frame's
/// read latch; both are released on drop, latch first.
pub struct ReadPageGuard {
    // Field order is load-bearing: the latch must release before the pin.
    data: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>,
    pin: PinGuard,
}

impl ReadPageGuard {
    pub(crate) fn new(pin: PinGuard) -> Self {
        let data = unsafe { read_latch_static(&pin.frame) };
        Self { data, pin }
    }

    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

/// RAII guard for exclusive access to a page. Mutable access marks the
/// page dirty, which the drop path folds into the frame.
pub struct WritePageGuard {
    data: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>,
    pin: PinGuard,
}

impl WritePageGuard {
    pub(crate) fn new(pin: PinGuard) -> Self {
        let data = unsafe { write_latch_static(&pin.frame) };
        Self { data, pin }
    }

    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.pin.mark_dirty = true;
        &mut self.data[..]
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
