//! Sort
//!
//! Materializes the child, stable-sorts by the ordered key list (ties fall
//! through to the next key), and optionally truncates to a limit. A
//! negative limit means no limit.

use std::cmp::Ordering;

use crate::catalog::schema::ColMeta;
use crate::error::Result;

use super::executor::{compare_records_by, find_col, Executor, Record};
use super::plan::OrderBy;

pub struct SortExecutor {
    child: Box<dyn Executor>,
    order: Vec<OrderBy>,
    limit: i32,
    rows: Option<Vec<Record>>,
    pos: usize,
}

impl SortExecutor {
    pub fn new(child: Box<dyn Executor>, order: Vec<OrderBy>, limit: i32) -> Self {
        Self {
            child,
            order,
            limit,
            rows: None,
            pos: 0,
        }
    }

    fn materialize(&mut self) -> Result<()> {
        let mut rows = Vec::new();
        self.child.begin_tuple()?;
        while !self.child.is_end() {
            rows.push(self.child.next()?);
            self.child.next_tuple()?;
        }

        let mut keys = Vec::with_capacity(self.order.len());
        for ob in &self.order {
            keys.push((find_col(self.child.columns(), &ob.col)?.clone(), ob.desc));
        }
        rows.sort_by(|a, b| {
            for (col, desc) in &keys {
                let ord = compare_records_by(col, &a.data, &b.data);
                if ord != Ordering::Equal {
                    return if *desc { ord.reverse() } else { ord };
                }
            }
            Ordering::Equal
        });

        if self.limit >= 0 {
            rows.truncate(self.limit as usize);
        }
        self.rows = Some(rows);
        Ok(())
    }
}

impl Executor for SortExecutor {
    fn begin_tuple(&mut self) -> Result<()> {
        if self.rows.is_none() {
            self.materialize()?;
        }
        self.pos = 0;
        Ok(())
    }

    fn next_tuple(&mut self) -> Result<()> {
        self.pos += 1;
        Ok(())
    }

    fn is_end(&self) -> bool {
        match &self.rows {
            Some(rows) => self.pos >= rows.len(),
            None => true,
        }
    }

    fn next(&mut self) -> Result<Record> {
        Ok(self.rows.as_ref().unwrap()[self.pos].clone())
    }

    fn columns(&self) -> &[ColMeta] {
        self.child.columns()
    }
}
