//! Delete executor
//!
//! Consumes a set of rids collected from a scan. Takes IX on the table for
//! a single-rid delete and X otherwise, then removes each record from the
//! heap and every index.

use std::sync::Arc;

use crate::catalog::schema::ColMeta;
use crate::catalog::SchemaManager;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::storage::Rid;

use super::executor::{Executor, Record};

pub struct DeleteExecutor {
    sm: Arc<SchemaManager>,
    table: String,
    rids: Vec<Rid>,
    ctx: Context,
    cols: Vec<ColMeta>,
    executed: bool,
}

impl DeleteExecutor {
    pub fn new(
        sm: &Arc<SchemaManager>,
        table: &str,
        rids: Vec<Rid>,
        ctx: Context,
    ) -> Result<Self> {
        let tab = sm.get_table(table)?;
        Ok(Self {
            sm: Arc::clone(sm),
            table: table.to_string(),
            rids,
            ctx,
            cols: tab.cols,
            executed: false,
        })
    }

    /// Run the delete; returns the number of removed rows.
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

        let indexes = self.sm.get_table_indexes(&self.table)?;
        for &rid in &self.rids {
            let image = heap.get_internal(rid)?;
            heap.delete(rid, &self.ctx)?;
            for (meta, tree) in &indexes {
                tree.delete(&meta.key_from_record(&image), rid, self.ctx.txn.as_ref())?;
            }
        }
        Ok(self.rids.len())
    }
}

impl Executor for DeleteExecutor {
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
        Err(Error::Internal("delete produces no tuples".to_string()))
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }
}
