//! Index scan
//!
//! Partitions the fed predicates into an equality prefix over the index
//! columns, at most one range column, and a residual filter; drives an
//! `IxScan` between the derived min/max keys. When the equality prefix
//! covers every index column a single tree lookup replaces the scan.

use std::sync::Arc;

use crate::catalog::schema::{ColMeta, IndexMeta};
use crate::catalog::types::{type_max_bytes, type_min_bytes, CompOp};
use crate::catalog::SchemaManager;
use crate::context::Context;
use crate::error::Result;
use crate::storage::btree::{BPlusTree, IxScan};
use crate::storage::heap::HeapFile;
use crate::storage::Rid;

use super::executor::{eval_conds, Executor, Record};
use super::plan::{CondRhs, Condition};

/// Build `(min_key, max_key)` for the index columns `cols` from the fed
/// predicates, per the equality-prefix / one-range-column rule. `≠` is never
/// pushed down.
pub(crate) fn build_range_keys(
    cols: &[ColMeta],
    conds: &[Condition],
) -> Result<(Vec<u8>, Vec<u8>, usize)> {
    let mut min_key = Vec::new();
    let mut max_key = Vec::new();
    let mut eq_len = 0;
    let mut range_used = false;

    for (i, col) in cols.iter().enumerate() {
        let col_conds: Vec<&Condition> = conds
            .iter()
            .filter(|c| {
                c.lhs_col.col_name == col.name
                    && matches!(c.rhs, CondRhs::Val(_))
                    && c.op != CompOp::Ne
            })
            .collect();

        // Equality pushdown requires a contiguous prefix of `=` columns.
        let eq = col_conds.iter().find(|c| c.op == CompOp::Eq);
        if let (Some(cond), true) = (eq, !range_used && eq_len == i) {
            let CondRhs::Val(value) = &cond.rhs else { unreachable!() };
            let bytes = value.clone().coerce_to(col.ty)?.to_bytes(col.len)?;
            min_key.extend_from_slice(&bytes);
            max_key.extend_from_slice(&bytes);
            eq_len = i + 1;
            continue;
        }

        if !range_used && eq_len == i {
            let lower = col_conds
                .iter()
                .find(|c| matches!(c.op, CompOp::Gt | CompOp::Ge));
            let upper = col_conds
                .iter()
                .find(|c| matches!(c.op, CompOp::Lt | CompOp::Le));
            if lower.is_some() || upper.is_some() {
                range_used = true;
                match lower {
                    Some(cond) => {
                        let CondRhs::Val(v) = &cond.rhs else { unreachable!() };
                        min_key.extend_from_slice(&v.clone().coerce_to(col.ty)?.to_bytes(col.len)?);
                    }
                    None => min_key.extend_from_slice(&type_min_bytes(col.ty, col.len)),
                }
                match upper {
                    Some(cond) => {
                        let CondRhs::Val(v) = &cond.rhs else { unreachable!() };
                        max_key.extend_from_slice(&v.clone().coerce_to(col.ty)?.to_bytes(col.len)?);
                    }
                    None => max_key.extend_from_slice(&type_max_bytes(col.ty, col.len)),
                }
                continue;
            }
        }

        // No further pushdown: widen to the full column domain.
        min_key.extend_from_slice(&type_min_bytes(col.ty, col.len));
        max_key.extend_from_slice(&type_max_bytes(col.ty, col.len));
    }
    Ok((min_key, max_key, eq_len))
}

pub struct IndexScanExecutor {
    heap: Arc<HeapFile>,
    cols: Vec<ColMeta>,
    conds: Vec<Condition>,
    ctx: Context,
    tree: Arc<BPlusTree>,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
    /// Equality predicates cover the whole key: one lookup suffices.
    single_read: bool,
    scan: Option<IxScan>,
    rid: Rid,
}

impl IndexScanExecutor {
    pub fn new(
        sm: &Arc<SchemaManager>,
        table: &str,
        conds: Vec<Condition>,
        index_cols: &[String],
        ctx: Context,
    ) -> Result<Self> {
        let tab = sm.get_table(table)?;
        let index: IndexMeta = tab.get_index_meta(&index_cols.to_vec())?.clone();
        let tree = sm.get_index(table, index_cols)?;
        let (min_key, max_key, eq_len) = build_range_keys(&index.cols, &conds)?;
        Ok(Self {
            heap: sm.get_heap(table)?,
            cols: tab.cols,
            single_read: eq_len == index.cols.len(),
            conds,
            ctx,
            tree,
            min_key,
            max_key,
            scan: None,
            rid: Rid::INVALID,
        })
    }

    fn find_match(&mut self) -> Result<()> {
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
        self.rid = Rid::INVALID;
        Ok(())
    }
}

impl Executor for IndexScanExecutor {
    fn begin_tuple(&mut self) -> Result<()> {
        if let Some(txn) = self.ctx.txn() {
            self.ctx.lock_mgr.lock_shared_on_table(txn, self.heap.fd())?;
        }
        if self.single_read {
            self.rid = Rid::INVALID;
            if let Some(rid) = self.tree.get(&self.min_key, self.ctx.txn.as_ref())? {
                let record = self.heap.get_internal(rid)?;
                if eval_conds(&self.cols, &self.conds, &record)? {
                    self.rid = rid;
                }
            }
            return Ok(());
        }
        // Contradictory bounds (a > 5 AND a < 3) select nothing.
        if self.tree.schema().compare(&self.min_key, &self.max_key) == std::cmp::Ordering::Greater
        {
            self.rid = Rid::INVALID;
            self.scan = None;
            return Ok(());
        }
        let lower = self.tree.lower_bound(&self.min_key)?;
        let upper = self.tree.upper_bound(&self.max_key)?;
        self.scan = Some(IxScan::new(Arc::clone(&self.tree), lower, upper));
        self.find_match()
    }

    fn next_tuple(&mut self) -> Result<()> {
        if self.single_read {
            self.rid = Rid::INVALID;
            return Ok(());
        }
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
