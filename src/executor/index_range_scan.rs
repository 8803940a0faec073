//! Index range scan over a dense leading integer column
//!
//! When the leading index column is an integer ranging freely and later
//! columns carry equality/range predicates, iterating the leading values
//! one-by-one and sub-scanning the tail columns beats one wide range scan.
//! Successive leading values are found with an upper-bound successor
//! lookup.

use std::sync::Arc;

use crate::catalog::schema::{ColMeta, IndexMeta};
use crate::catalog::types::{type_max_bytes, ColType};
use crate::catalog::SchemaManager;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::storage::btree::{BPlusTree, IxScan};
use crate::storage::heap::HeapFile;
use crate::storage::Rid;

use super::executor::{eval_conds, Executor, Record};
use super::index_scan::build_range_keys;
use super::plan::Condition;

pub struct IndexRangeScanExecutor {
    heap: Arc<HeapFile>,
    cols: Vec<ColMeta>,
    conds: Vec<Condition>,
    ctx: Context,
    tree: Arc<BPlusTree>,
    index: IndexMeta,
    /// Key bounds of the trailing columns, shared by every sub-scan
    tail_min: Vec<u8>,
    tail_max: Vec<u8>,
    current: i32,
    last: i32,
    scan: Option<IxScan>,
    rid: Rid,
}

impl IndexRangeScanExecutor {
    pub fn new(
        sm: &Arc<SchemaManager>,
        table: &str,
        conds: Vec<Condition>,
        index_cols: &[String],
        ctx: Context,
    ) -> Result<Self> {
        let tab = sm.get_table(table)?;
        let index: IndexMeta = tab.get_index_meta(&index_cols.to_vec())?.clone();
        if index.cols[0].ty != ColType::Int {
            return Err(Error::Internal(
                "index range scan needs an integer leading column".to_string(),
            ));
        }
        let tree = sm.get_index(table, index_cols)?;
        let (tail_min, tail_max, _) = build_range_keys(&index.cols[1..], &conds)?;
        Ok(Self {
            heap: sm.get_heap(table)?,
            cols: tab.cols,
            conds,
            ctx,
            tree,
            index,
            tail_min,
            tail_max,
            current: 0,
            last: -1,
            scan: None,
            rid: Rid::INVALID,
        })
    }

    fn open_sub_scan(&mut self) -> Result<()> {
        let mut min_key = self.current.to_le_bytes().to_vec();
        min_key.extend_from_slice(&self.tail_min);
        let mut max_key = self.current.to_le_bytes().to_vec();
        max_key.extend_from_slice(&self.tail_max);
        // Contradictory tail bounds select nothing for every leading value.
        let (lower, upper) =
            if self.tree.schema().compare(&min_key, &max_key) == std::cmp::Ordering::Greater {
                let at = self.tree.leaf_begin();
                (at, at)
            } else {
                (
                    self.tree.lower_bound(&min_key)?,
                    self.tree.upper_bound(&max_key)?,
                )
            };
        self.scan = Some(IxScan::new(Arc::clone(&self.tree), lower, upper));
        Ok(())
    }

    /// Next leading-column value after `current`, via upper bound on the
    /// largest possible key with this leading value.
    fn successor(&self) -> Result<Option<i32>> {
        let mut key = self.current.to_le_bytes().to_vec();
        for col in &self.index.cols[1..] {
            key.extend_from_slice(&type_max_bytes(col.ty, col.len));
        }
        let iid = self.tree.upper_bound(&key)?;
        if iid == self.tree.leaf_end()? {
            return Ok(None);
        }
        self.tree.find_ind_key_at(iid)
    }

    fn find_match(&mut self) -> Result<()> {
        loop {
            let scan = self.scan.as_mut().unwrap();
            while !scan.is_end() {
                let rid = scan.rid()?;
                let record = self.heap.get_internal(rid)?;
                if eval_conds(&self.cols, &self.conds, &record)? {
                    self.rid = rid;
                    return Ok(());
                }
                scan.next()?;
            }
            // Sub-scan exhausted: move to the next leading value.
            if self.current >= self.last {
                break;
            }
            match self.successor()? {
                Some(v) if v <= self.last => {
                    self.current = v;
                    self.open_sub_scan()?;
                }
                _ => break,
            }
        }
        self.rid = Rid::INVALID;
        Ok(())
    }
}

impl Executor for IndexRangeScanExecutor {
    fn begin_tuple(&mut self) -> Result<()> {
        if let Some(txn) = self.ctx.txn() {
            self.ctx.lock_mgr.lock_shared_on_table(txn, self.heap.fd())?;
        }
        self.current = self.tree.first_ind_key()?;
        self.last = self.tree.last_ind_key()?;
        if self.current > self.last {
            self.rid = Rid::INVALID;
            return Ok(());
        }
        self.open_sub_scan()?;
        self.find_match()
    }

    fn next_tuple(&mut self) -> Result<()> {
        self.scan.as_mut().unwrap().next()?;
        self.find_match()
    }

    fn is_end(&self) -> bool {
        self.rid == Rid::INVALID
    }

    fn next(&mut self) -> Result<Record> {
        Ok(Record::new(self.heap.get_internal(self.rid)?))
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }

    fn rid(&self) -> Rid {
        self.rid
    }
}
