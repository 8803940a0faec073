//! Transaction state
//!
//! A `Transaction` carries everything needed to undo it: the write set
//! (pre-images of every mutation, walked backwards on abort), the set of
//! held locks, and the index page latches retained by B+tree latch coupling.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use crate::storage::buffer_pool::PageHandle;
use crate::storage::wal::{Lsn, INVALID_LSN};
use crate::storage::Rid;
use crate::transaction::lock_manager::LockDataId;

/// 2PL lifecycle: growing until the first unlock, then shrinking, then a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Kind of mutation recorded for undo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

/// Undo entry: enough to invert one mutation. For INSERT the record is the
/// inserted image (needed to remove index entries); for UPDATE and DELETE it
/// is the pre-image.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub kind: WriteKind,
    pub table: String,
    pub rid: Rid,
    pub record: Vec<u8>,
}

/// Latch mode retained on an index page during latch coupling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchMode {
    Read,
    Write,
}

/// A retained index page latch: released (and the page unpinned) when the
/// B+tree operation finishes or the node proves safe.
pub struct IndexLatch {
    pub handle: PageHandle,
    pub mode: LatchMode,
}

impl IndexLatch {
    /// Release the latch; dropping the handle unpins the page.
    pub fn release(self) {
        match self.mode {
            LatchMode::Read => self.handle.page().latch.unlock_read(),
            LatchMode::Write => self.handle.page().latch.unlock_write(),
        }
    }
}

pub struct Transaction {
    id: i32,
    state: Mutex<TxnState>,
    prev_lsn: AtomicI32,
    write_set: Mutex<Vec<WriteRecord>>,
    lock_set: Mutex<HashSet<LockDataId>>,
    index_latch_set: Mutex<Vec<IndexLatch>>,
}

impl Transaction {
    pub fn new(id: i32) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: Mutex::new(TxnState::Growing),
            prev_lsn: AtomicI32::new(INVALID_LSN),
            write_set: Mutex::new(Vec::new()),
            lock_set: Mutex::new(HashSet::new()),
            index_latch_set: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn state(&self) -> TxnState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: TxnState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn prev_lsn(&self) -> Lsn {
        self.prev_lsn.load(Ordering::SeqCst)
    }

    pub fn set_prev_lsn(&self, lsn: Lsn) {
        self.prev_lsn.store(lsn, Ordering::SeqCst);
    }

    pub fn append_write_record(&self, record: WriteRecord) {
        self.write_set.lock().unwrap().push(record);
    }

    /// Drain the write set (commit clears it; abort walks it in reverse).
    pub fn take_write_set(&self) -> Vec<WriteRecord> {
        std::mem::take(&mut self.write_set.lock().unwrap())
    }

    pub fn append_lock(&self, id: LockDataId) {
        self.lock_set.lock().unwrap().insert(id);
    }

    pub fn take_lock_set(&self) -> HashSet<LockDataId> {
        std::mem::take(&mut self.lock_set.lock().unwrap())
    }

    pub fn holds_lock(&self, id: &LockDataId) -> bool {
        self.lock_set.lock().unwrap().contains(id)
    }

    pub fn append_index_latch(&self, latch: IndexLatch) {
        self.index_latch_set.lock().unwrap().push(latch);
    }

    /// Drain the retained index latches for release.
    pub fn take_index_latches(&self) -> Vec<IndexLatch> {
        std::mem::take(&mut self.index_latch_set.lock().unwrap())
    }
}
