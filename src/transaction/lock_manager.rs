//! Hierarchical lock manager
//!
//! Table and record locks in IS/IX/S/SIX/X modes under strict two-phase
//! locking. Conflicts never wait: a request incompatible with a holder from
//! another transaction aborts the requester (`DeadlockPrevention`), which
//! makes deadlock impossible by construction.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use log::warn;

use crate::error::{Error, Result};
use crate::storage::Rid;
use crate::transaction::transaction::{Transaction, TxnState};

/// Lock mode of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    IntentionShared,
    IntentionExclusive,
    Shared,
    SharedIntentionExclusive,
    Exclusive,
}

impl LockMode {
    /// Standard hierarchical-lock compatibility matrix.
    pub fn compatible(self, other: LockMode) -> bool {
        use LockMode::*;
        match (self, other) {
            (IntentionShared, Exclusive) | (Exclusive, IntentionShared) => false,
            (IntentionShared, _) | (_, IntentionShared) => true,
            (IntentionExclusive, IntentionExclusive) => true,
            (IntentionExclusive, _) | (_, IntentionExclusive) => false,
            (Shared, Shared) => true,
            (Shared, _) | (_, Shared) => false,
            // SIX vs SIX, SIX vs X, X vs anything
            _ => false,
        }
    }

    /// Mode resulting from the same transaction re-requesting: the least
    /// upper bound in the IS < {S, IX} < SIX < X lattice.
    fn upgraded(self, req: LockMode) -> LockMode {
        use LockMode::*;
        match (self, req) {
            (Exclusive, _) | (_, Exclusive) => Exclusive,
            (SharedIntentionExclusive, _) | (_, SharedIntentionExclusive) => {
                SharedIntentionExclusive
            }
            (Shared, IntentionExclusive) | (IntentionExclusive, Shared) => {
                SharedIntentionExclusive
            }
            (Shared, _) | (_, Shared) => Shared,
            (IntentionExclusive, _) | (_, IntentionExclusive) => IntentionExclusive,
            (IntentionShared, IntentionShared) => IntentionShared,
        }
    }
}

/// Identity of a lockable object: a whole table file or one record in it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockDataId {
    Table { fd: i32 },
    Record { fd: i32, rid: Rid },
}

#[derive(Debug)]
struct LockRequest {
    txn_id: i32,
    mode: LockMode,
}

#[derive(Debug, Default)]
struct LockRequestQueue {
    /// FIFO bookkeeping of granted requests; no-wait means nothing in the
    /// queue is ever blocked.
    queue: VecDeque<LockRequest>,
}

/// Process-wide lock table
#[derive(Default)]
pub struct LockManager {
    table: Mutex<HashMap<LockDataId, LockRequestQueue>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_is_on_table(&self, txn: &Arc<Transaction>, fd: i32) -> Result<()> {
        self.lock(txn, LockDataId::Table { fd }, LockMode::IntentionShared)
    }

    pub fn lock_ix_on_table(&self, txn: &Arc<Transaction>, fd: i32) -> Result<()> {
        self.lock(txn, LockDataId::Table { fd }, LockMode::IntentionExclusive)
    }

    pub fn lock_shared_on_table(&self, txn: &Arc<Transaction>, fd: i32) -> Result<()> {
        self.lock(txn, LockDataId::Table { fd }, LockMode::Shared)
    }

    pub fn lock_six_on_table(&self, txn: &Arc<Transaction>, fd: i32) -> Result<()> {
        self.lock(
            txn,
            LockDataId::Table { fd },
            LockMode::SharedIntentionExclusive,
        )
    }

    pub fn lock_exclusive_on_table(&self, txn: &Arc<Transaction>, fd: i32) -> Result<()> {
        self.lock(txn, LockDataId::Table { fd }, LockMode::Exclusive)
    }

    pub fn lock_shared_on_record(&self, txn: &Arc<Transaction>, fd: i32, rid: Rid) -> Result<()> {
        self.lock(txn, LockDataId::Record { fd, rid }, LockMode::Shared)
    }

    pub fn lock_exclusive_on_record(
        &self,
        txn: &Arc<Transaction>,
        fd: i32,
        rid: Rid,
    ) -> Result<()> {
        self.lock(txn, LockDataId::Record { fd, rid }, LockMode::Exclusive)
    }

    fn lock(&self, txn: &Arc<Transaction>, id: LockDataId, mode: LockMode) -> Result<()> {
        match txn.state() {
            TxnState::Growing => {}
            TxnState::Shrinking => return Err(Error::LockOnShrinking(txn.id())),
            other => {
                return Err(Error::Internal(format!(
                    "lock request on transaction in state {other:?}"
                )))
            }
        }

        let mut table = self.table.lock().unwrap();
        let entry = table.entry(id).or_default();

        // No-wait: any incompatible holder from another transaction aborts
        // the requester.
        for req in &entry.queue {
            if req.txn_id != txn.id() && !mode.compatible(req.mode) {
                warn!(
                    "txn {} aborted: {:?} lock on {:?} conflicts with txn {} holding {:?}",
                    txn.id(),
                    mode,
                    id,
                    req.txn_id,
                    req.mode
                );
                return Err(Error::DeadlockPrevention(txn.id()));
            }
        }

        if let Some(req) = entry.queue.iter_mut().find(|r| r.txn_id == txn.id()) {
            req.mode = req.mode.upgraded(mode);
        } else {
            entry.queue.push_back(LockRequest {
                txn_id: txn.id(),
                mode,
            });
            txn.append_lock(id);
        }
        Ok(())
    }

    /// Release one lock held by `txn`. Empty queues are removed from the
    /// table.
    pub fn unlock(&self, txn: &Arc<Transaction>, id: LockDataId) {
        if matches!(txn.state(), TxnState::Growing) {
            txn.set_state(TxnState::Shrinking);
        }
        let mut table = self.table.lock().unwrap();
        if let Some(entry) = table.get_mut(&id) {
            entry.queue.retain(|r| r.txn_id != txn.id());
            if entry.queue.is_empty() {
                table.remove(&id);
            }
        }
    }

    /// Mode currently held by `txn` on `id`, if any.
    pub fn held_mode(&self, txn_id: i32, id: LockDataId) -> Option<LockMode> {
        let table = self.table.lock().unwrap();
        table
            .get(&id)?
            .queue
            .iter()
            .find(|r| r.txn_id == txn_id)
            .map(|r| r.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LockMode::*;

    #[test]
    fn test_compatibility_matrix() {
        let modes = [
            IntentionShared,
            IntentionExclusive,
            Shared,
            SharedIntentionExclusive,
            Exclusive,
        ];
        let expected = [
            [true, true, true, true, false],
            [true, true, false, false, false],
            [true, false, true, false, false],
            [true, false, false, false, false],
            [false, false, false, false, false],
        ];
        for (i, &a) in modes.iter().enumerate() {
            for (j, &b) in modes.iter().enumerate() {
                assert_eq!(a.compatible(b), expected[i][j], "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn test_shared_then_exclusive_conflicts() {
        let mgr = LockManager::new();
        let t1 = Transaction::new(1);
        let t2 = Transaction::new(2);

        mgr.lock_shared_on_table(&t1, 0).unwrap();
        let err = mgr.lock_exclusive_on_table(&t2, 0);
        assert!(matches!(err, Err(Error::DeadlockPrevention(2))));

        // t1 still holds its lock.
        assert_eq!(
            mgr.held_mode(1, LockDataId::Table { fd: 0 }),
            Some(Shared)
        );
    }

    #[test]
    fn test_same_txn_upgrade() {
        let mgr = LockManager::new();
        let t1 = Transaction::new(1);

        mgr.lock_ix_on_table(&t1, 0).unwrap();
        mgr.lock_shared_on_table(&t1, 0).unwrap();
        assert_eq!(
            mgr.held_mode(1, LockDataId::Table { fd: 0 }),
            Some(SharedIntentionExclusive)
        );
    }

    #[test]
    fn test_intention_modes_coexist() {
        let mgr = LockManager::new();
        let t1 = Transaction::new(1);
        let t2 = Transaction::new(2);

        mgr.lock_ix_on_table(&t1, 0).unwrap();
        mgr.lock_ix_on_table(&t2, 0).unwrap();
        mgr.lock_exclusive_on_record(&t1, 0, Rid::new(1, 0)).unwrap();
        mgr.lock_exclusive_on_record(&t2, 0, Rid::new(1, 1)).unwrap();

        // Same record conflicts.
        let err = mgr.lock_shared_on_record(&t2, 0, Rid::new(1, 0));
        assert!(matches!(err, Err(Error::DeadlockPrevention(2))));
    }

    #[test]
    fn test_lock_on_shrinking_rejected() {
        let mgr = LockManager::new();
        let t1 = Transaction::new(1);

        mgr.lock_shared_on_table(&t1, 0).unwrap();
        mgr.unlock(&t1, LockDataId::Table { fd: 0 });
        assert_eq!(t1.state(), TxnState::Shrinking);

        let err = mgr.lock_shared_on_table(&t1, 0);
        assert!(matches!(err, Err(Error::LockOnShrinking(1))));
    }

    #[test]
    fn test_unlock_removes_empty_queue() {
        let mgr = LockManager::new();
        let t1 = Transaction::new(1);
        mgr.lock_shared_on_table(&t1, 3).unwrap();
        mgr.unlock(&t1, LockDataId::Table { fd: 3 });
        assert!(mgr.table.lock().unwrap().is_empty());
    }
}
