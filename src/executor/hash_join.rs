//! Hash join
//!
//! Builds an in-memory multimap over the left child keyed by its side of
//! the first join-equality condition, then streams the right child and
//! probes. Key equality is byte equality over the fixed column layout.
//! Output order is probe order, with build-side insertion order within one
//! probe key.

use std::collections::HashMap;

use crate::catalog::schema::ColMeta;
use crate::error::{Error, Result};

use super::executor::{find_col, eval_conds, Executor, Record};
use super::nested_loop_join::merge_join_cols;
use super::plan::{CondRhs, Condition};

pub struct HashJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    conds: Vec<Condition>,
    cols: Vec<ColMeta>,
    /// (offset, len) of the key column on each side
    left_key: (usize, usize),
    right_key: (usize, usize),
    table: HashMap<Vec<u8>, Vec<Record>>,
    matches: Vec<Record>,
    match_pos: usize,
    probe: Option<Record>,
    merged: Option<Record>,
}

impl HashJoinExecutor {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        conds: Vec<Condition>,
    ) -> Result<Self> {
        let join_eq = conds
            .iter()
            .find(|c| c.is_join_eq())
            .ok_or_else(|| {
                Error::Internal("hash join requires an equi-join condition".to_string())
            })?
            .clone();
        let CondRhs::Col(rhs_col) = &join_eq.rhs else { unreachable!() };

        // Decide which side of the equality belongs to the left child.
        let (left_col, right_col) = if find_col(left.columns(), &join_eq.lhs_col).is_ok() {
            (&join_eq.lhs_col, rhs_col)
        } else {
            (rhs_col, &join_eq.lhs_col)
        };
        let lk = find_col(left.columns(), left_col)?;
        let rk = find_col(right.columns(), right_col)?;
        if lk.ty != rk.ty {
            return Err(Error::IncompatibleType {
                lhs: lk.ty.to_string(),
                rhs: rk.ty.to_string(),
            });
        }
        let left_key = (lk.offset, lk.len);
        let right_key = (rk.offset, rk.len);

        let cols = merge_join_cols(left.columns(), right.columns());
        Ok(Self {
            left,
            right,
            conds,
            cols,
            left_key,
            right_key,
            table: HashMap::new(),
            matches: Vec::new(),
            match_pos: 0,
            probe: None,
            merged: None,
        })
    }

    /// Exhaust the build side into the multimap.
    fn build(&mut self) -> Result<()> {
        self.table.clear();
        self.left.begin_tuple()?;
        while !self.left.is_end() {
            let record = self.left.next()?;
            let key = record.data[self.left_key.0..self.left_key.0 + self.left_key.1].to_vec();
            self.table.entry(key).or_default().push(record);
            self.left.next_tuple()?;
        }
        Ok(())
    }

    fn find_match(&mut self) -> Result<()> {
        loop {
            if let Some(probe) = &self.probe {
                while self.match_pos < self.matches.len() {
                    let build = &self.matches[self.match_pos];
                    self.match_pos += 1;
                    let mut data = build.data.clone();
                    data.extend_from_slice(&probe.data);
                    if eval_conds(&self.cols, &self.conds, &data)? {
                        self.merged = Some(Record::new(data));
                        return Ok(());
                    }
                }
            }
            if self.right.is_end() {
                self.merged = None;
                return Ok(());
            }
            let probe = self.right.next()?;
            self.right.next_tuple()?;
            let key = &probe.data[self.right_key.0..self.right_key.0 + self.right_key.1];
            self.matches = self.table.get(key).cloned().unwrap_or_default();
            self.match_pos = 0;
            self.probe = Some(probe);
        }
    }
}

impl Executor for HashJoinExecutor {
    fn begin_tuple(&mut self) -> Result<()> {
        self.build()?;
        self.right.begin_tuple()?;
        self.probe = None;
        self.matches.clear();
        self.match_pos = 0;
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
