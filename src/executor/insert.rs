//! Insert executor
//!
//! Validates and coerces the value list against the table schema, probes
//! every index for duplicates before touching the heap, then writes the
//! record and its index entries.

use std::sync::Arc;

use crate::catalog::schema::ColMeta;
use crate::catalog::types::Value;
use crate::catalog::SchemaManager;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::storage::Rid;

use super::executor::{Executor, Record};

pub struct InsertExecutor {
    sm: Arc<SchemaManager>,
    table: String,
    values: Vec<Value>,
    ctx: Context,
    cols: Vec<ColMeta>,
    executed: bool,
}

impl InsertExecutor {
    pub fn new(
        sm: &Arc<SchemaManager>,
        table: &str,
        values: Vec<Value>,
        ctx: Context,
    ) -> Result<Self> {
        let tab = sm.get_table(table)?;
        Ok(Self {
            sm: Arc::clone(sm),
            table: table.to_string(),
            values,
            ctx,
            cols: tab.cols,
            executed: false,
        })
    }

    /// Run the insert; returns the new record's rid.
    pub fn execute(&mut self) -> Result<Rid> {
        let tab = self.sm.get_table(&self.table)?;
        if self.values.len() != tab.cols.len() {
            return Err(Error::InvalidValueCount {
                expected: tab.cols.len(),
                given: self.values.len(),
            });
        }

        let mut record = vec![0u8; tab.record_size()];
        for (col, value) in tab.cols.iter().zip(&self.values) {
            let bytes = value.clone().coerce_to(col.ty)?.to_bytes(col.len)?;
            record[col.offset..col.offset + col.len].copy_from_slice(&bytes);
        }

        let heap = self.sm.get_heap(&self.table)?;
        if let Some(txn) = self.ctx.txn() {
            self.ctx.lock_mgr.lock_ix_on_table(txn, heap.fd())?;
        }

        // Unique-index precheck before any heap mutation.
        let indexes = self.sm.get_table_indexes(&self.table)?;
        for (meta, tree) in &indexes {
            if tree.contains(&meta.key_from_record(&record), self.ctx.txn.as_ref())? {
                return Err(Error::IndexInsertDuplicated);
            }
        }

        let rid = heap.insert(&record, &self.ctx)?;
        for (meta, tree) in &indexes {
            tree.insert(&meta.key_from_record(&record), rid, self.ctx.txn.as_ref())?;
        }
        Ok(rid)
    }
}

impl Executor for InsertExecutor {
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
        Err(Error::Internal("insert produces no tuples".to_string()))
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }
}
