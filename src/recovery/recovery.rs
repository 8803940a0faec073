//! Recovery manager
//!
//! Three sequential phases over the on-disk log:
//!
//! 1. **Analysis** - deserialize the whole log in order; the undo set is
//!    every transaction with a BEGIN but no later COMMIT or ABORT.
//! 2. **Redo** - re-apply each mutation whose target page does not already
//!    reflect it (page-LSN check; pages missing from the file are allocated
//!    first).
//! 3. **Undo** - walk the log backwards inverting every mutation of the undo
//!    set, emitting compensating records, closing each transaction with an
//!    ABORT record.
//!
//! Afterwards every index is rebuilt from the heaps: index files carry no
//! reliable LSN for structural changes, so their on-disk state is untrusted.

use std::collections::HashSet;
use std::sync::Arc;

use log::info;

use crate::catalog::SchemaManager;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::storage::disk::DiskManager;
use crate::storage::heap::HeapFile;
use crate::storage::wal::{LogManager, LogRecord, LogRecordBody};

pub struct RecoveryManager {
    disk: Arc<DiskManager>,
    log_mgr: Arc<LogManager>,
    sm: Arc<SchemaManager>,
}

impl RecoveryManager {
    pub fn new(disk: Arc<DiskManager>, log_mgr: Arc<LogManager>, sm: Arc<SchemaManager>) -> Self {
        Self { disk, log_mgr, sm }
    }

    /// Run analysis, redo and undo, then rebuild indexes and flush. `ctx`
    /// must carry no transaction.
    pub fn recover(&self, ctx: &Context) -> Result<()> {
        let records = self.analyze()?;
        if records.is_empty() {
            self.sm.rebuild_indexes(ctx)?;
            return Ok(());
        }

        let max_lsn = records.iter().map(|r| r.lsn).max().unwrap();
        // Fresh LSNs for compensation records continue after the log tail.
        self.log_mgr.reset_lsn(max_lsn + 1);

        let mut undo_set: HashSet<i32> = HashSet::new();
        for record in &records {
            match record.body {
                LogRecordBody::Begin => {
                    undo_set.insert(record.txn_id);
                }
                LogRecordBody::Commit | LogRecordBody::Abort => {
                    undo_set.remove(&record.txn_id);
                }
                _ => {}
            }
        }
        info!(
            "recovery: {} log records, {} transactions to undo",
            records.len(),
            undo_set.len()
        );

        self.redo(&records)?;
        self.undo(&records, undo_set)?;
        self.log_mgr.flush_log_to_disk()?;

        self.sm.rebuild_indexes(ctx)?;
        for tab in self.sm.tables() {
            let heap = self.sm.get_heap(&tab)?;
            self.sm.buffer_pool().flush_all(heap.fd())?;
        }
        info!("recovery: done");
        Ok(())
    }

    /// Read and deserialize the whole log file. Corrupt framing aborts
    /// recovery.
    fn analyze(&self) -> Result<Vec<LogRecord>> {
        let len = self.disk.log_size()? as usize;
        let mut buf = vec![0u8; len];
        let read = self.disk.read_log(&mut buf, 0)?;
        if read != len {
            return Err(Error::Internal("short read of log file".to_string()));
        }

        let mut records = Vec::new();
        let mut pos = 0;
        while pos < len {
            let (record, total_len) = LogRecord::deserialize(&buf[pos..])?;
            pos += total_len;
            records.push(record);
        }
        Ok(records)
    }

    fn redo(&self, records: &[LogRecord]) -> Result<()> {
        for record in records {
            if !record.body.is_mutation() {
                continue;
            }
            let (table, rid) = match &record.body {
                LogRecordBody::Insert { table, rid, .. }
                | LogRecordBody::Delete { table, rid, .. }
                | LogRecordBody::Update { table, rid, .. } => (table, *rid),
                _ => unreachable!(),
            };
            // Mutations of since-dropped tables have nothing to redo.
            if !self.sm.is_table(table) {
                continue;
            }
            let heap = self.sm.get_heap(table)?;
            heap.ensure_pages(rid.page_no)?;

            #[cfg(feature = "page-lsn")]
            if heap.page_lsn(rid.page_no)? >= record.lsn {
                continue;
            }

            match &record.body {
                LogRecordBody::Insert { image, .. } => {
                    if heap.is_record_stored(rid)? {
                        heap.update_raw(rid, image)?;
                    } else {
                        heap.insert_at(rid, image)?;
                    }
                }
                LogRecordBody::Delete { .. } => {
                    if heap.is_record_stored(rid)? {
                        heap.delete_raw(rid)?;
                    }
                }
                LogRecordBody::Update { after, .. } => {
                    if heap.is_record_stored(rid)? {
                        heap.update_raw(rid, after)?;
                    } else {
                        heap.insert_at(rid, after)?;
                    }
                }
                _ => unreachable!(),
            }
            #[cfg(feature = "page-lsn")]
            heap.set_page_lsn(rid.page_no, record.lsn)?;
        }
        Ok(())
    }

    fn undo(&self, records: &[LogRecord], mut undo_set: HashSet<i32>) -> Result<()> {
        for record in records.iter().rev() {
            if undo_set.is_empty() {
                break;
            }
            if !undo_set.contains(&record.txn_id) {
                continue;
            }
            match &record.body {
                LogRecordBody::Begin => {
                    self.log_mgr
                        .add_log_record(record.txn_id, record.lsn, LogRecordBody::Abort)?;
                    undo_set.remove(&record.txn_id);
                }
                LogRecordBody::Insert { table, rid, image } => {
                    if let Some(heap) = self.heap_if_present(table)? {
                        self.log_mgr.add_log_record(
                            record.txn_id,
                            record.lsn,
                            LogRecordBody::Delete {
                                table: table.clone(),
                                rid: *rid,
                                image: image.clone(),
                            },
                        )?;
                        heap.delete_raw(*rid)?;
                    }
                }
                LogRecordBody::Delete { table, rid, image } => {
                    if let Some(heap) = self.heap_if_present(table)? {
                        self.log_mgr.add_log_record(
                            record.txn_id,
                            record.lsn,
                            LogRecordBody::Insert {
                                table: table.clone(),
                                rid: *rid,
                                image: image.clone(),
                            },
                        )?;
                        heap.insert_at(*rid, image)?;
                    }
                }
                LogRecordBody::Update {
                    table,
                    rid,
                    before,
                    after,
                } => {
                    if let Some(heap) = self.heap_if_present(table)? {
                        self.log_mgr.add_log_record(
                            record.txn_id,
                            record.lsn,
                            LogRecordBody::Update {
                                table: table.clone(),
                                rid: *rid,
                                before: after.clone(),
                                after: before.clone(),
                            },
                        )?;
                        heap.update_raw(*rid, before)?;
                    }
                }
                LogRecordBody::Commit | LogRecordBody::Abort => {}
            }
        }
        Ok(())
    }

    fn heap_if_present(&self, table: &str) -> Result<Option<Arc<HeapFile>>> {
        if self.sm.is_table(table) {
            Ok(Some(self.sm.get_heap(table)?))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColType;
    use crate::storage::buffer_pool::BufferPoolManager;
    use crate::storage::Rid;
    use crate::transaction::lock_manager::LockManager;
    use crate::transaction::TransactionManager;
    use tempfile::TempDir;

    struct Harness {
        sm: Arc<SchemaManager>,
        tm: TransactionManager,
        rm: RecoveryManager,
        ctx: Context,
    }

    fn open(dir: &TempDir) -> Harness {
        let disk = Arc::new(DiskManager::new(dir.path()).unwrap());
        let log = Arc::new(LogManager::new(Arc::clone(&disk)));
        let bpm = Arc::new(BufferPoolManager::new(256, Arc::clone(&disk), Arc::clone(&log)));
        let sm = SchemaManager::open(Arc::clone(&disk), bpm).unwrap();
        let lock = Arc::new(LockManager::new());
        let tm = TransactionManager::new(Arc::clone(&sm), Arc::clone(&lock), Arc::clone(&log));
        let rm = RecoveryManager::new(disk, Arc::clone(&log), Arc::clone(&sm));
        let ctx = Context::new(lock, log, None);
        Harness { sm, tm, rm, ctx }
    }

    fn txn_ctx(h: &Harness, txn: &Arc<crate::transaction::Transaction>) -> Context {
        Context::new(
            Arc::clone(&h.ctx.lock_mgr),
            Arc::clone(&h.ctx.log_mgr),
            Some(Arc::clone(txn)),
        )
    }

    fn int_record(v: i32) -> Vec<u8> {
        v.to_le_bytes().to_vec()
    }

    #[test]
    fn test_committed_work_survives_crash() {
        let dir = TempDir::new().unwrap();
        let rid;
        {
            // Session 1: commit two inserts, then "crash" without flushing
            // any heap page (only the WAL reached disk on commit).
            let h = open(&dir);
            h.sm.create_table("t", &[("a".to_string(), ColType::Int, 0)])
                .unwrap();
            h.sm.create_index("t", &["a".to_string()], &h.ctx).unwrap();

            let txn = h.tm.begin(None).unwrap();
            let ctx = txn_ctx(&h, &txn);
            let heap = h.sm.get_heap("t").unwrap();
            rid = heap.insert(&int_record(1), &ctx).unwrap();
            heap.insert(&int_record(2), &ctx).unwrap();
            h.tm.commit(&txn).unwrap();
            // no flush_all: dirty pages are lost with the crash
        }
        {
            // Session 2: recovery replays both inserts and rebuilds the
            // index.
            let h = open(&dir);
            h.rm.recover(&h.ctx).unwrap();
            let heap = h.sm.get_heap("t").unwrap();
            assert_eq!(heap.num_records().unwrap(), 2);
            assert_eq!(heap.get_internal(rid).unwrap(), int_record(1));
            let tree = h.sm.get_index("t", &["a".to_string()]).unwrap();
            assert!(tree.contains(&int_record(2), None).unwrap());
        }
    }

    #[test]
    fn test_uncommitted_work_rolled_back() {
        let dir = TempDir::new().unwrap();
        {
            let h = open(&dir);
            h.sm.create_table("t", &[("a".to_string(), ColType::Int, 0)])
                .unwrap();

            // Committed baseline row.
            let t1 = h.tm.begin(None).unwrap();
            let ctx1 = txn_ctx(&h, &t1);
            let heap = h.sm.get_heap("t").unwrap();
            heap.insert(&int_record(10), &ctx1).unwrap();
            h.tm.commit(&t1).unwrap();

            // In-flight transaction: never commits, but its dirty pages
            // reach disk.
            let t2 = h.tm.begin(None).unwrap();
            let ctx2 = txn_ctx(&h, &t2);
            heap.insert(&int_record(20), &ctx2).unwrap();
            h.ctx.log_mgr.flush_log_to_disk().unwrap();
            h.sm.buffer_pool().flush_all(heap.fd()).unwrap();
        }
        {
            let h = open(&dir);
            h.rm.recover(&h.ctx).unwrap();
            let heap = h.sm.get_heap("t").unwrap();
            assert_eq!(heap.num_records().unwrap(), 1);
        }
        {
            // Recovery is idempotent: a second crash-restart changes
            // nothing.
            let h = open(&dir);
            h.rm.recover(&h.ctx).unwrap();
            assert_eq!(h.sm.get_heap("t").unwrap().num_records().unwrap(), 1);
        }
    }

    #[test]
    fn test_undo_restores_updates_and_deletes() {
        let dir = TempDir::new().unwrap();
        let (rid1, rid2) = {
            let h = open(&dir);
            h.sm.create_table("t", &[("a".to_string(), ColType::Int, 0)])
                .unwrap();
            let t1 = h.tm.begin(None).unwrap();
            let ctx1 = txn_ctx(&h, &t1);
            let heap = h.sm.get_heap("t").unwrap();
            let rid1 = heap.insert(&int_record(1), &ctx1).unwrap();
            let rid2 = heap.insert(&int_record(2), &ctx1).unwrap();
            h.tm.commit(&t1).unwrap();

            let t2 = h.tm.begin(None).unwrap();
            let ctx2 = txn_ctx(&h, &t2);
            heap.update(rid1, &int_record(100), &ctx2).unwrap();
            heap.delete(rid2, &ctx2).unwrap();
            h.ctx.log_mgr.flush_log_to_disk().unwrap();
            h.sm.buffer_pool().flush_all(heap.fd()).unwrap();
            (rid1, rid2)
        };
        {
            let h = open(&dir);
            h.rm.recover(&h.ctx).unwrap();
            let heap = h.sm.get_heap("t").unwrap();
            assert_eq!(heap.get_internal(rid1).unwrap(), int_record(1));
            assert_eq!(heap.get_internal(rid2).unwrap(), int_record(2));
        }
    }

    #[test]
    fn test_commit_then_recover_is_noop_on_heap() {
        let dir = TempDir::new().unwrap();
        {
            let h = open(&dir);
            h.sm.create_table("t", &[("a".to_string(), ColType::Int, 0)])
                .unwrap();
            let t1 = h.tm.begin(None).unwrap();
            let ctx1 = txn_ctx(&h, &t1);
            let heap = h.sm.get_heap("t").unwrap();
            heap.insert(&int_record(7), &ctx1).unwrap();
            h.tm.commit(&t1).unwrap();
            h.sm.buffer_pool().flush_all(heap.fd()).unwrap();
            h.sm.close().unwrap();
        }
        {
            let h = open(&dir);
            h.rm.recover(&h.ctx).unwrap();
            let heap = h.sm.get_heap("t").unwrap();
            assert_eq!(heap.num_records().unwrap(), 1);
        }
    }

    #[test]
    fn test_corrupt_log_aborts_recovery() {
        let dir = TempDir::new().unwrap();
        let h = open(&dir);
        h.ctx.log_mgr
            .add_log_record(0, -1, LogRecordBody::Begin)
            .unwrap();
        h.ctx.log_mgr.flush_log_to_disk().unwrap();
        // Append garbage that cannot frame a record.
        h.rm.disk.append_log(&[0xFF; 7]).unwrap();
        assert!(h.rm.recover(&h.ctx).is_err());
    }
}
