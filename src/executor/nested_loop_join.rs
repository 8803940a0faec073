//! In-memory nested loop join
//!
//! The outer (left) child drives; the inner child is rescanned for every
//! outer tuple. Matching tuples are concatenated left-then-right.

use crate::catalog::schema::ColMeta;
use crate::error::Result;

use super::executor::{eval_conds, Executor, Record};
use super::plan::Condition;

/// Concatenated output layout of a join: left columns then right columns,
/// right offsets shifted past the left tuple.
pub(crate) fn merge_join_cols(left: &[ColMeta], right: &[ColMeta]) -> Vec<ColMeta> {
    let left_len: usize = left.iter().map(|c| c.len).sum();
    let mut cols = left.to_vec();
    for col in right {
        let mut col = col.clone();
        col.offset += left_len;
        cols.push(col);
    }
    cols
}

pub struct NestedLoopJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    conds: Vec<Condition>,
    cols: Vec<ColMeta>,
    merged: Option<Record>,
}

impl NestedLoopJoinExecutor {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        conds: Vec<Condition>,
    ) -> Self {
        let cols = merge_join_cols(left.columns(), right.columns());
        Self {
            left,
            right,
            conds,
            cols,
            merged: None,
        }
    }

    fn find_match(&mut self) -> Result<()> {
        while !self.left.is_end() {
            let outer = self.left.next()?;
            while !self.right.is_end() {
                let inner = self.right.next()?;
                self.right.next_tuple()?;
                let mut data = outer.data.clone();
                data.extend_from_slice(&inner.data);
                if eval_conds(&self.cols, &self.conds, &data)? {
                    self.merged = Some(Record::new(data));
                    return Ok(());
                }
            }
            self.left.next_tuple()?;
            self.right.begin_tuple()?;
        }
        self.merged = None;
        Ok(())
    }
}

impl Executor for NestedLoopJoinExecutor {
    fn begin_tuple(&mut self) -> Result<()> {
        self.left.begin_tuple()?;
        self.right.begin_tuple()?;
        self.find_match()
    }

    fn next_tuple(&mut self) -> Result<()> {
        self.find_match()
    }

    fn is_end(&self) -> bool {
        self.merged.is_none()
    }

    fn next(&mut self) -> Result<Record> {
        Ok(self.merged.clone().expect("next past end of join"))
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }
}
