//! Page frames for FerroDB
//!
//! A `Page` is one fixed-size buffer-pool frame plus its metadata: the disk
//! identity currently loaded into it, a dirty flag, a pin count, the page
//! LSN, and a reader/writer latch used by B+tree latch coupling.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Mutex;

use crate::storage::latch::RwLatch;
use crate::storage::wal::{Lsn, INVALID_LSN};
use crate::storage::{INVALID_PAGE_NO, PAGE_SIZE};

/// Disk identity of a page: file descriptor plus page number within the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId {
    pub fd: i32,
    pub page_no: i32,
}

impl PageId {
    pub const INVALID: PageId = PageId {
        fd: -1,
        page_no: INVALID_PAGE_NO,
    };

    pub fn new(fd: i32, page_no: i32) -> Self {
        Self { fd, page_no }
    }
}

/// One buffer-pool frame
pub struct Page {
    id: Mutex<PageId>,
    pin_count: AtomicI32,
    dirty: AtomicBool,
    lsn: AtomicI32,
    /// Latch over the frame contents, taken by index latch coupling
    pub latch: RwLatch,
    data: Mutex<Box<[u8]>>,
}

impl Page {
    pub fn new() -> Self {
        Self {
            id: Mutex::new(PageId::INVALID),
            pin_count: AtomicI32::new(0),
            dirty: AtomicBool::new(false),
            lsn: AtomicI32::new(INVALID_LSN),
            latch: RwLatch::new(),
            data: Mutex::new(vec![0u8; PAGE_SIZE].into_boxed_slice()),
        }
    }

    pub fn id(&self) -> PageId {
        *self.id.lock().unwrap()
    }

    pub fn set_id(&self, id: PageId) {
        *self.id.lock().unwrap() = id;
    }

    pub fn pin_count(&self) -> i32 {
        self.pin_count.load(Ordering::SeqCst)
    }

    pub fn pin(&self) -> i32 {
        self.pin_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn unpin(&self) -> i32 {
        let prev = self.pin_count.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "unpin of unpinned page");
        prev - 1
    }

    pub fn reset_pin_count(&self, n: i32) {
        self.pin_count.store(n, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::SeqCst);
    }

    pub fn lsn(&self) -> Lsn {
        self.lsn.load(Ordering::SeqCst)
    }

    pub fn set_lsn(&self, lsn: Lsn) {
        self.lsn.store(lsn, Ordering::SeqCst);
    }

    /// Run `f` with shared access to the frame bytes.
    pub fn with_read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let data = self.data.lock().unwrap();
        f(&data)
    }

    /// Run `f` with exclusive access to the frame bytes; marks the frame
    /// dirty.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut data = self.data.lock().unwrap();
        self.dirty.store(true, Ordering::SeqCst);
        f(&mut data)
    }

    /// Replace the whole frame contents without marking dirty (used when
    /// loading a page from disk).
    pub fn load(&self, bytes: &[u8]) {
        let mut data = self.data.lock().unwrap();
        data.copy_from_slice(bytes);
    }

    /// Zero the frame contents without marking dirty.
    pub fn zero(&self) {
        let mut data = self.data.lock().unwrap();
        data.fill(0);
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}
