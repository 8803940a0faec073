//! Sequential scan
//!
//! Walks the heap under a shared table lock, applying the fed predicates as
//! a residual filter.

use std::sync::Arc;

use crate::catalog::schema::ColMeta;
use crate::catalog::SchemaManager;
use crate::context::Context;
use crate::error::Result;
use crate::storage::heap::{HeapFile, HeapScan};
use crate::storage::Rid;

use super::executor::{eval_conds, Executor, Record};
use super::plan::Condition;

pub struct SeqScanExecutor {
    heap: Arc<HeapFile>,
    cols: Vec<ColMeta>,
    conds: Vec<Condition>,
    ctx: Context,
    scan: Option<HeapScan>,
    rid: Rid,
}

impl SeqScanExecutor {
    pub fn new(
        sm: &Arc<SchemaManager>,
        table: &str,
        conds: Vec<Condition>,
        ctx: Context,
    ) -> Result<Self> {
        let tab = sm.get_table(table)?;
        Ok(Self {
            heap: sm.get_heap(table)?,
            cols: tab.cols,
            conds,
            ctx,
            scan: None,
            rid: Rid::INVALID,
        })
    }

    /// Move the underlying scan to the next record satisfying the filter.
    fn find_match(&mut self) -> Result<()> {
        let scan = self.scan.as_mut().unwrap();
        while !scan.is_end() {
            let rid = scan.rid();
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

impl Executor for SeqScanExecutor {
    fn begin_tuple(&mut self) -> Result<()> {
        self.scan = Some(self.heap.scan(&self.ctx)?);
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
