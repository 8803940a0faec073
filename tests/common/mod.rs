//! Shared wiring for integration tests: a fully assembled engine over a
//! temporary directory.

use std::path::Path;
use std::sync::Arc;

use ferrodb::catalog::SchemaManager;
use ferrodb::context::Context;
use ferrodb::executor::{execute_plan, ExecutionResult, Plan};
use ferrodb::recovery::RecoveryManager;
use ferrodb::storage::buffer_pool::BufferPoolManager;
use ferrodb::storage::disk::DiskManager;
use ferrodb::storage::wal::LogManager;
use ferrodb::storage::BUFFER_POOL_SIZE;
use ferrodb::transaction::lock_manager::LockManager;
use ferrodb::transaction::{Transaction, TransactionManager};
use ferrodb::Result;

pub struct Db {
    pub sm: Arc<SchemaManager>,
    pub tm: TransactionManager,
    pub rm: RecoveryManager,
    pub lock_mgr: Arc<LockManager>,
    pub log_mgr: Arc<LogManager>,
}

impl Db {
    /// Assemble the engine over `dir` without running recovery.
    pub fn open(dir: &Path) -> Db {
        let _ = env_logger::builder().is_test(true).try_init();
        let disk = Arc::new(DiskManager::new(dir).unwrap());
        let log_mgr = Arc::new(LogManager::new(Arc::clone(&disk)));
        let bpm = Arc::new(BufferPoolManager::new(
            BUFFER_POOL_SIZE,
            Arc::clone(&disk),
            Arc::clone(&log_mgr),
        ));
        let sm = SchemaManager::open(Arc::clone(&disk), bpm).unwrap();
        let lock_mgr = Arc::new(LockManager::new());
        let tm = TransactionManager::new(
            Arc::clone(&sm),
            Arc::clone(&lock_mgr),
            Arc::clone(&log_mgr),
        );
        let rm = RecoveryManager::new(disk, Arc::clone(&log_mgr), Arc::clone(&sm));
        Db {
            sm,
            tm,
            rm,
            lock_mgr,
            log_mgr,
        }
    }

    /// Assemble the engine and replay the log, as a restart would.
    pub fn open_with_recovery(dir: &Path) -> Db {
        let db = Db::open(dir);
        db.rm.recover(&db.ctx()).unwrap();
        db
    }

    /// A context without a transaction (auto-commit style statement).
    pub fn ctx(&self) -> Context {
        Context::new(Arc::clone(&self.lock_mgr), Arc::clone(&self.log_mgr), None)
    }

    /// A context running under `txn`.
    pub fn txn_ctx(&self, txn: &Arc<Transaction>) -> Context {
        Context::new(
            Arc::clone(&self.lock_mgr),
            Arc::clone(&self.log_mgr),
            Some(Arc::clone(txn)),
        )
    }

    pub fn run(&self, ctx: &Context, plan: &Plan) -> Result<ExecutionResult> {
        execute_plan(&self.sm, ctx, plan)
    }
}

pub fn int_at(row: &ferrodb::executor::Record, off: usize) -> i32 {
    i32::from_le_bytes(row.data[off..off + 4].try_into().unwrap())
}
