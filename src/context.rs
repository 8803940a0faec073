//! Per-statement execution context
//!
//! Bundles the process-wide managers a storage or executor operation needs,
//! plus the transaction it runs under (if any). Passed by reference instead
//! of living in globals.

use std::sync::Arc;

use crate::storage::wal::LogManager;
use crate::transaction::lock_manager::LockManager;
use crate::transaction::transaction::Transaction;

#[derive(Clone)]
pub struct Context {
    pub lock_mgr: Arc<LockManager>,
    pub log_mgr: Arc<LogManager>,
    pub txn: Option<Arc<Transaction>>,
}

impl Context {
    pub fn new(
        lock_mgr: Arc<LockManager>,
        log_mgr: Arc<LogManager>,
        txn: Option<Arc<Transaction>>,
    ) -> Self {
        Self {
            lock_mgr,
            log_mgr,
            txn,
        }
    }

    /// The running transaction, if this statement is transactional.
    pub fn txn(&self) -> Option<&Arc<Transaction>> {
        self.txn.as_ref()
    }
}
