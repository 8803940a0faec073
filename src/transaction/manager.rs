//! Transaction manager
//!
//! Begin/commit/abort. Abort walks the transaction's write set backwards and
//! inverts each mutation against the heap and every index, emitting a
//! compensating WAL record per inversion.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use log::info;

use crate::catalog::SchemaManager;
use crate::error::Result;
use crate::storage::wal::{LogManager, LogRecordBody};
use crate::transaction::lock_manager::LockManager;
use crate::transaction::transaction::{Transaction, TxnState, WriteKind};

pub struct TransactionManager {
    next_txn_id: AtomicI32,
    txn_map: Mutex<HashMap<i32, Arc<Transaction>>>,
    lock_mgr: Arc<LockManager>,
    log_mgr: Arc<LogManager>,
    sm: Arc<SchemaManager>,
}

impl TransactionManager {
    pub fn new(
        sm: Arc<SchemaManager>,
        lock_mgr: Arc<LockManager>,
        log_mgr: Arc<LogManager>,
    ) -> Self {
        Self {
            next_txn_id: AtomicI32::new(0),
            txn_map: Mutex::new(HashMap::new()),
            lock_mgr,
            log_mgr,
            sm,
        }
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_mgr
    }

    pub fn log_manager(&self) -> &Arc<LogManager> {
        &self.log_mgr
    }

    /// Start a transaction: register it and write its BEGIN record. A
    /// pre-built transaction (recovery) is registered as-is.
    pub fn begin(&self, txn: Option<Arc<Transaction>>) -> Result<Arc<Transaction>> {
        let txn = match txn {
            Some(txn) => txn,
            None => {
                let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
                Transaction::new(id)
            }
        };
        self.txn_map
            .lock()
            .unwrap()
            .insert(txn.id(), Arc::clone(&txn));
        let lsn = self
            .log_mgr
            .add_log_record(txn.id(), txn.prev_lsn(), LogRecordBody::Begin)?;
        txn.set_prev_lsn(lsn);
        Ok(txn)
    }

    pub fn get_transaction(&self, txn_id: i32) -> Option<Arc<Transaction>> {
        self.txn_map.lock().unwrap().get(&txn_id).cloned()
    }

    /// Commit: release every lock, clear the write set, make the COMMIT
    /// record durable.
    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<()> {
        txn.set_state(TxnState::Shrinking);
        for lock_id in txn.take_lock_set() {
            self.lock_mgr.unlock(txn, lock_id);
        }
        txn.take_write_set();

        let lsn = self
            .log_mgr
            .add_log_record(txn.id(), txn.prev_lsn(), LogRecordBody::Commit)?;
        txn.set_prev_lsn(lsn);
        self.log_mgr.flush_log_to_disk()?;

        txn.set_state(TxnState::Committed);
        self.txn_map.lock().unwrap().remove(&txn.id());
        Ok(())
    }

    /// Abort: undo the write set in reverse (heap and indexes), each
    /// inversion logged as a compensating record, then release locks.
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<()> {
        info!("aborting transaction {}", txn.id());
        let write_set = txn.take_write_set();
        for wr in write_set.into_iter().rev() {
            let heap = self.sm.get_heap(&wr.table)?;
            let indexes = self.sm.get_table_indexes(&wr.table)?;
            match wr.kind {
                WriteKind::Insert => {
                    let lsn = self.log_mgr.add_log_record(
                        txn.id(),
                        txn.prev_lsn(),
                        LogRecordBody::Delete {
                            table: wr.table.clone(),
                            rid: wr.rid,
                            image: wr.record.clone(),
                        },
                    )?;
                    txn.set_prev_lsn(lsn);
                    for (meta, tree) in &indexes {
                        tree.delete(&meta.key_from_record(&wr.record), wr.rid, None)?;
                    }
                    heap.delete_raw(wr.rid)?;
                    #[cfg(feature = "page-lsn")]
                    heap.set_page_lsn(wr.rid.page_no, lsn)?;
                }
                WriteKind::Delete => {
                    let lsn = self.log_mgr.add_log_record(
                        txn.id(),
                        txn.prev_lsn(),
                        LogRecordBody::Insert {
                            table: wr.table.clone(),
                            rid: wr.rid,
                            image: wr.record.clone(),
                        },
                    )?;
                    txn.set_prev_lsn(lsn);
                    heap.insert_at(wr.rid, &wr.record)?;
                    for (meta, tree) in &indexes {
                        tree.insert(&meta.key_from_record(&wr.record), wr.rid, None)?;
                    }
                    #[cfg(feature = "page-lsn")]
                    heap.set_page_lsn(wr.rid.page_no, lsn)?;
                }
                WriteKind::Update => {
                    let current = heap.get_internal(wr.rid)?;
                    let lsn = self.log_mgr.add_log_record(
                        txn.id(),
                        txn.prev_lsn(),
                        LogRecordBody::Update {
                            table: wr.table.clone(),
                            rid: wr.rid,
                            before: current.clone(),
                            after: wr.record.clone(),
                        },
                    )?;
                    txn.set_prev_lsn(lsn);
                    heap.update_raw(wr.rid, &wr.record)?;
                    for (meta, tree) in &indexes {
                        let old_key = meta.key_from_record(&current);
                        let new_key = meta.key_from_record(&wr.record);
                        if old_key != new_key {
                            tree.delete(&old_key, wr.rid, None)?;
                            tree.insert(&new_key, wr.rid, None)?;
                        }
                    }
                    #[cfg(feature = "page-lsn")]
                    heap.set_page_lsn(wr.rid.page_no, lsn)?;
                }
            }
        }

        txn.set_state(TxnState::Shrinking);
        for lock_id in txn.take_lock_set() {
            self.lock_mgr.unlock(txn, lock_id);
        }

        let lsn = self
            .log_mgr
            .add_log_record(txn.id(), txn.prev_lsn(), LogRecordBody::Abort)?;
        txn.set_prev_lsn(lsn);
        self.log_mgr.flush_log_to_disk()?;

        txn.set_state(TxnState::Aborted);
        self.txn_map.lock().unwrap().remove(&txn.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColType;
    use crate::context::Context;
    use crate::storage::buffer_pool::BufferPoolManager;
    use crate::storage::disk::DiskManager;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<SchemaManager>, TransactionManager, Context) {
        let dir = TempDir::new().unwrap();
        let disk = Arc::new(DiskManager::new(dir.path()).unwrap());
        let log = Arc::new(LogManager::new(Arc::clone(&disk)));
        let bpm = Arc::new(BufferPoolManager::new(256, Arc::clone(&disk), Arc::clone(&log)));
        let sm = SchemaManager::open(disk, bpm).unwrap();
        let lock = Arc::new(LockManager::new());
        let tm = TransactionManager::new(Arc::clone(&sm), Arc::clone(&lock), Arc::clone(&log));
        let ctx = Context::new(lock, log, None);
        (dir, sm, tm, ctx)
    }

    fn int_record(v: i32) -> Vec<u8> {
        v.to_le_bytes().to_vec()
    }

    #[test]
    fn test_abort_undoes_insert() {
        let (_dir, sm, tm, ctx) = setup();
        sm.create_table("t", &[("a".to_string(), ColType::Int, 0)])
            .unwrap();
        sm.create_index("t", &["a".to_string()], &ctx).unwrap();

        let txn = tm.begin(None).unwrap();
        let txn_ctx = Context::new(
            Arc::clone(&ctx.lock_mgr),
            Arc::clone(&ctx.log_mgr),
            Some(Arc::clone(&txn)),
        );
        let heap = sm.get_heap("t").unwrap();
        let rid = heap.insert(&int_record(5), &txn_ctx).unwrap();
        let tree = sm.get_index("t", &["a".to_string()]).unwrap();
        tree.insert(&int_record(5), rid, Some(&txn)).unwrap();

        tm.abort(&txn).unwrap();
        assert_eq!(txn.state(), TxnState::Aborted);
        assert_eq!(heap.num_records().unwrap(), 0);
        assert!(!tree.contains(&int_record(5), None).unwrap());
    }

    #[test]
    fn test_abort_restores_delete_and_update() {
        let (_dir, sm, tm, ctx) = setup();
        sm.create_table("t", &[("a".to_string(), ColType::Int, 0)])
            .unwrap();
        let heap = sm.get_heap("t").unwrap();
        let rid1 = heap.insert(&int_record(1), &ctx).unwrap();
        let rid2 = heap.insert(&int_record(2), &ctx).unwrap();

        let txn = tm.begin(None).unwrap();
        let txn_ctx = Context::new(
            Arc::clone(&ctx.lock_mgr),
            Arc::clone(&ctx.log_mgr),
            Some(Arc::clone(&txn)),
        );
        heap.delete(rid1, &txn_ctx).unwrap();
        heap.update(rid2, &int_record(20), &txn_ctx).unwrap();
        assert_eq!(heap.num_records().unwrap(), 1);

        tm.abort(&txn).unwrap();
        assert_eq!(heap.num_records().unwrap(), 2);
        assert_eq!(heap.get_internal(rid1).unwrap(), int_record(1));
        assert_eq!(heap.get_internal(rid2).unwrap(), int_record(2));
    }

    #[test]
    fn test_commit_releases_locks() {
        let (_dir, sm, tm, ctx) = setup();
        sm.create_table("t", &[("a".to_string(), ColType::Int, 0)])
            .unwrap();
        let heap = sm.get_heap("t").unwrap();

        let t1 = tm.begin(None).unwrap();
        let ctx1 = Context::new(
            Arc::clone(&ctx.lock_mgr),
            Arc::clone(&ctx.log_mgr),
            Some(Arc::clone(&t1)),
        );
        heap.insert(&int_record(1), &ctx1).unwrap();
        tm.commit(&t1).unwrap();
        assert_eq!(t1.state(), TxnState::Committed);

        // A second transaction can now take an exclusive table lock.
        let t2 = tm.begin(None).unwrap();
        ctx.lock_mgr
            .lock_exclusive_on_table(&t2, heap.fd())
            .unwrap();
        tm.commit(&t2).unwrap();
    }
}
