//! Block nested loop join
//!
//! Buffers outer tuples up to a fixed byte budget, then streams the inner
//! child once per block, probing the whole buffered block for each inner
//! tuple. This bounds inner-side rescans to one per outer block instead of
//! one per outer tuple.

use crate::catalog::schema::ColMeta;
use crate::error::Result;

use super::executor::{eval_conds, Executor, Record};
use super::nested_loop_join::merge_join_cols;
use super::plan::Condition;

/// Byte budget of the buffered outer block
pub const JOIN_BLOCK_SIZE: usize = 64 * 1024 * 1024;

pub struct BlockNestedLoopJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    conds: Vec<Condition>,
    cols: Vec<ColMeta>,
    block: Vec<Record>,
    block_pos: usize,
    inner: Option<Record>,
    merged: Option<Record>,
}

impl BlockNestedLoopJoinExecutor {
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
            block: Vec::new(),
            block_pos: 0,
            inner: None,
            merged: None,
        }
    }

    /// Refill the outer block up to the byte budget.
    fn fill_block(&mut self) -> Result<()> {
        self.block.clear();
        let mut bytes = 0;
        while !self.left.is_end() && bytes < JOIN_BLOCK_SIZE {
            let record = self.left.next()?;
            bytes += record.data.len();
            self.block.push(record);
            self.left.next_tuple()?;
        }
        Ok(())
    }

    fn find_match(&mut self) -> Result<()> {
        loop {
            // Probe the current inner tuple against the rest of the block.
            if let Some(inner) = &self.inner {
                while self.block_pos < self.block.len() {
                    let outer = &self.block[self.block_pos];
                    self.block_pos += 1;
                    let mut data = outer.data.clone();
                    data.extend_from_slice(&inner.data);
                    if eval_conds(&self.cols, &self.conds, &data)? {
                        self.merged = Some(Record::new(data));
                        return Ok(());
                    }
                }
            }

            // Advance the inner side within this block.
            if !self.right.is_end() {
                self.inner = Some(self.right.next()?);
                self.right.next_tuple()?;
                self.block_pos = 0;
                continue;
            }

            // Inner exhausted: refill from the outer side.
            if self.left.is_end() {
                self.merged = None;
                return Ok(());
            }
            self.fill_block()?;
            if self.block.is_empty() {
                self.merged = None;
                return Ok(());
            }
            self.right.begin_tuple()?;
            self.inner = None;
            if self.right.is_end() {
                self.merged = None;
                return Ok(());
            }
        }
    }
}

impl Executor for BlockNestedLoopJoinExecutor {
    fn begin_tuple(&mut self) -> Result<()> {
        self.left.begin_tuple()?;
        self.fill_block()?;
        if self.block.is_empty() {
            self.merged = None;
            return Ok(());
        }
        self.right.begin_tuple()?;
        self.inner = None;
        self.block_pos = 0;
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
