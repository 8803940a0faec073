//! Update executor
//!
//! Consumes a set of rids and a list of SET clauses. Computes every
//! post-image first, runs a batch unique-index precheck (collisions within
//! the batch, and against the table excluding the rows being updated), then
//! applies heap updates and swaps the changed index entries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::catalog::schema::ColMeta;
use crate::catalog::types::{SetOp, Value};
use crate::catalog::SchemaManager;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::storage::Rid;

use super::executor::{Executor, Record};
use super::plan::SetClause;

pub struct UpdateExecutor {
    sm: Arc<SchemaManager>,
    table: String,
    rids: Vec<Rid>,
    set_clauses: Vec<SetClause>,
    ctx: Context,
    cols: Vec<ColMeta>,
    executed: bool,
}

impl UpdateExecutor {
    pub fn new(
        sm: &Arc<SchemaManager>,
        table: &str,
        rids: Vec<Rid>,
        set_clauses: Vec<SetClause>,
        ctx: Context,
    ) -> Result<Self> {
        let tab = sm.get_table(table)?;
        Ok(Self {
            sm: Arc::clone(sm),
            table: table.to_string(),
            rids,
            set_clauses,
            ctx,
            cols: tab.cols,
            executed: false,
        })
    }

    /// Compute the post-image of one record under the SET clauses.
    fn apply_sets(&self, pre: &[u8]) -> Result<Vec<u8>> {
        let mut post = pre.to_vec();
        for clause in &self.set_clauses {
            let col = self
                .cols
                .iter()
                .find(|c| c.name == clause.lhs.col_name)
                .ok_or_else(|| Error::ColumnNotFound(clause.lhs.col_name.clone()))?;
            let rhs = clause.rhs.clone().coerce_to(col.ty)?;
            let new_value = match clause.op {
                SetOp::Assign => rhs,
                SetOp::Plus => {
                    let cur = Value::from_bytes(col.ty, &pre[col.offset..col.offset + col.len]);
                    cur.add(&rhs)?
                }
                SetOp::Minus => {
                    let cur = Value::from_bytes(col.ty, &pre[col.offset..col.offset + col.len]);
                    cur.sub(&rhs)?
                }
            };
            let bytes = new_value.to_bytes(col.len)?;
            post[col.offset..col.offset + col.len].copy_from_slice(&bytes);
        }
        Ok(post)
    }

    /// Run the update; returns the number of updated rows.
    pub fn execute(&mut self) -> Result<usize> {
        if self.rids.is_empty() {
            return Ok(0);
        }
        let heap = self.sm.get_heap(&self.table)?;
        if let Some(txn) = self.ctx.txn() {
            if self.rids.len() == 1 {
                self.ctx.lock_mgr.lock_ix_on_table(txn, heap.fd())?;
            } else {
                self.ctx.lock_mgr.lock_exclusive_on_table(txn, heap.fd())?;
            }
        }

        let mut images: HashMap<Rid, (Vec<u8>, Vec<u8>)> = HashMap::new();
        for &rid in &self.rids {
            let pre = heap.get_internal(rid)?;
            let post = self.apply_sets(&pre)?;
            images.insert(rid, (pre, post));
        }

        // Batch unique precheck: new keys must neither collide within the
        // batch nor with live entries outside the updated rows.
        let rid_set: HashSet<Rid> = self.rids.iter().copied().collect();
        let indexes = self.sm.get_table_indexes(&self.table)?;
        for (meta, tree) in &indexes {
            let mut batch_keys = HashSet::new();
            for &rid in &self.rids {
                let (_, post) = &images[&rid];
                let key = meta.key_from_record(post);
                if !batch_keys.insert(key.clone()) {
                    return Err(Error::IndexInsertDuplicated);
                }
                if let Some(found) = tree.get(&key, self.ctx.txn.as_ref())? {
                    if !rid_set.contains(&found) {
                        return Err(Error::IndexInsertDuplicated);
                    }
                }
            }
        }

        for &rid in &self.rids {
            let (_, post) = &images[&rid];
            heap.update(rid, post, &self.ctx)?;
        }
        // Swap index entries in two passes so rows exchanging keys within
        // the batch never collide transiently.
        for (meta, tree) in &indexes {
            for &rid in &self.rids {
                let (pre, post) = &images[&rid];
                if meta.key_from_record(pre) != meta.key_from_record(post) {
                    tree.delete(&meta.key_from_record(pre), rid, self.ctx.txn.as_ref())?;
                }
            }
            for &rid in &self.rids {
                let (pre, post) = &images[&rid];
                let new_key = meta.key_from_record(post);
                if meta.key_from_record(pre) != new_key {
                    tree.insert(&new_key, rid, self.ctx.txn.as_ref())?;
                }
            }
        }
        Ok(self.rids.len())
    }
}

impl Executor for UpdateExecutor {
    fn begin_tuple(&mut self) -> Result<()> {
        if !self.executed {
            self.execute()?;
            self.executed = true;
        }
        Ok(())
    }

    fn next_tuple(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_end(&self) -> bool {
        true
    }

    fn next(&mut self) -> Result<Record> {
        Err(Error::Internal("update produces no tuples".to_string()))
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }
}
