//! Projection
//!
//! Precomputes the input position of each output column; `next` copies the
//! selected byte ranges into a fresh buffer. The no-copy variant forwards
//! the child's buffer untouched when the selection is an identity prefix of
//! the child layout.

use crate::catalog::schema::ColMeta;
use crate::error::Result;
use crate::storage::Rid;

use super::executor::{find_col, Executor, Record};
use super::plan::TabCol;

pub struct ProjectionExecutor {
    child: Box<dyn Executor>,
    cols: Vec<ColMeta>,
    sel_idxs: Vec<usize>,
}

impl ProjectionExecutor {
    pub fn new(child: Box<dyn Executor>, sel_cols: &[TabCol]) -> Result<Self> {
        let mut cols = Vec::with_capacity(sel_cols.len());
        let mut sel_idxs = Vec::with_capacity(sel_cols.len());
        let mut offset = 0;
        for target in sel_cols {
            let src = find_col(child.columns(), target)?;
            let idx = child
                .columns()
                .iter()
                .position(|c| std::ptr::eq(c, src))
                .unwrap();
            sel_idxs.push(idx);
            let mut out = src.clone();
            out.offset = offset;
            offset += out.len;
            cols.push(out);
        }
        Ok(Self {
            child,
            cols,
            sel_idxs,
        })
    }

    /// Whether the selection forwards a prefix of the child layout
    /// unchanged.
    pub fn is_identity_prefix(child: &dyn Executor, sel_cols: &[TabCol]) -> bool {
        sel_cols.len() <= child.columns().len()
            && sel_cols.iter().zip(child.columns()).all(|(target, col)| {
                col.name == target.col_name
                    && (target.tab_name.is_empty() || col.tab_name == target.tab_name)
            })
    }
}

impl Executor for ProjectionExecutor {
    fn begin_tuple(&mut self) -> Result<()> {
        self.child.begin_tuple()
    }

    fn next_tuple(&mut self) -> Result<()> {
        self.child.next_tuple()
    }

    fn is_end(&self) -> bool {
        self.child.is_end()
    }

    fn next(&mut self) -> Result<Record> {
        let input = self.child.next()?;
        let in_cols = self.child.columns();
        let mut data = Vec::with_capacity(self.tuple_len());
        for &idx in &self.sel_idxs {
            let src = &in_cols[idx];
            data.extend_from_slice(&input.data[src.offset..src.offset + src.len]);
        }
        Ok(Record::new(data))
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }

    fn rid(&self) -> Rid {
        self.child.rid()
    }
}

/// Identity projection: the output columns are a layout-matching prefix of
/// the child's, so child buffers pass through without copying.
pub struct ProjectionNocopyExecutor {
    child: Box<dyn Executor>,
    cols: Vec<ColMeta>,
}

impl ProjectionNocopyExecutor {
    pub fn new(child: Box<dyn Executor>, sel_cols: &[TabCol]) -> Result<Self> {
        debug_assert!(ProjectionExecutor::is_identity_prefix(child.as_ref(), sel_cols));
        let cols = child.columns()[..sel_cols.len()].to_vec();
        Ok(Self { child, cols })
    }
}

impl Executor for ProjectionNocopyExecutor {
    fn begin_tuple(&mut self) -> Result<()> {
        self.child.begin_tuple()
    }

    fn next_tuple(&mut self) -> Result<()> {
        self.child.next_tuple()
    }

    fn is_end(&self) -> bool {
        self.child.is_end()
    }

    fn next(&mut self) -> Result<Record> {
        self.child.next()
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }

    fn tuple_len(&self) -> usize {
        self.child.tuple_len()
    }

    fn rid(&self) -> Rid {
        self.child.rid()
    }
}
