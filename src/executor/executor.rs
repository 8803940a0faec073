//! Executor contract and predicate evaluation
//!
//! Every operator is a pull-based iterator over opaque record buffers whose
//! layout is described by `columns()`. `begin_tuple` positions at the first
//! tuple, `next_tuple` advances, `next` materializes the current tuple.

use std::cmp::Ordering;

use crate::catalog::schema::ColMeta;
use crate::catalog::types::{compare_bytes, validate_datetime, ColType, Value};
use crate::error::{Error, Result};
use crate::storage::Rid;

use super::plan::{CondRhs, Condition, TabCol};

/// An owned record buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// Volcano-model operator contract
pub trait Executor {
    /// Initialize and position at the first tuple.
    fn begin_tuple(&mut self) -> Result<()>;

    /// Advance to the next tuple.
    fn next_tuple(&mut self) -> Result<()>;

    fn is_end(&self) -> bool;

    /// The current tuple as an owned buffer.
    fn next(&mut self) -> Result<Record>;

    /// Layout of the produced records.
    fn columns(&self) -> &[ColMeta];

    fn tuple_len(&self) -> usize {
        self.columns().iter().map(|c| c.len).sum()
    }

    /// Heap rid of the current tuple; only scan leaves yield a meaningful
    /// one.
    fn rid(&self) -> Rid {
        Rid::INVALID
    }
}

/// Locate a column in an executor's output layout. An empty table qualifier
/// matches any table.
pub fn find_col<'a>(cols: &'a [ColMeta], target: &TabCol) -> Result<&'a ColMeta> {
    cols.iter()
        .find(|c| {
            c.name == target.col_name
                && (target.tab_name.is_empty() || c.tab_name == target.tab_name)
        })
        .ok_or_else(|| Error::ColumnNotFound(target.col_name.clone()))
}

/// Evaluate one predicate against a record.
pub fn eval_cond(cols: &[ColMeta], cond: &Condition, record: &[u8]) -> Result<bool> {
    let lhs = find_col(cols, &cond.lhs_col)?;
    let lhs_bytes = &record[lhs.offset..lhs.offset + lhs.len];

    let ord = match &cond.rhs {
        CondRhs::Val(value) => {
            // DATETIME literals arrive as strings and are validated here.
            if lhs.ty == ColType::Datetime {
                if let Value::Str(s) = value {
                    validate_datetime(s)?;
                }
            }
            let rhs_bytes = value.clone().coerce_to(lhs.ty)?.to_bytes(lhs.len)?;
            compare_bytes(lhs.ty, lhs.len, lhs_bytes, &rhs_bytes)
        }
        CondRhs::Col(rhs_col) => {
            let rhs = find_col(cols, rhs_col)?;
            if rhs.ty != lhs.ty {
                return Err(Error::IncompatibleType {
                    lhs: lhs.ty.to_string(),
                    rhs: rhs.ty.to_string(),
                });
            }
            compare_bytes(
                lhs.ty,
                lhs.len,
                lhs_bytes,
                &record[rhs.offset..rhs.offset + rhs.len],
            )
        }
    };
    Ok(cond.op.matches(ord))
}

/// Conjunction of all predicates.
pub fn eval_conds(cols: &[ColMeta], conds: &[Condition], record: &[u8]) -> Result<bool> {
    for cond in conds {
        if !eval_cond(cols, cond, record)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Typed comparison of one column between two records with the same layout.
pub fn compare_records_by(col: &ColMeta, a: &[u8], b: &[u8]) -> Ordering {
    compare_bytes(
        col.ty,
        col.len,
        &a[col.offset..col.offset + col.len],
        &b[col.offset..col.offset + col.len],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::CompOp;

    fn cols() -> Vec<ColMeta> {
        vec![
            ColMeta {
                tab_name: "t".into(),
                name: "a".into(),
                ty: ColType::Int,
                len: 4,
                offset: 0,
                index: false,
            },
            ColMeta {
                tab_name: "t".into(),
                name: "b".into(),
                ty: ColType::String,
                len: 4,
                offset: 4,
                index: false,
            },
        ]
    }

    fn record(a: i32, b: &[u8; 4]) -> Vec<u8> {
        let mut rec = a.to_le_bytes().to_vec();
        rec.extend_from_slice(b);
        rec
    }

    #[test]
    fn test_eval_value_conditions() {
        let cols = cols();
        let rec = record(5, b"ab\0\0");

        let cond = Condition {
            lhs_col: TabCol::new("t", "a"),
            op: CompOp::Ge,
            rhs: CondRhs::Val(Value::Int(5)),
        };
        assert!(eval_cond(&cols, &cond, &rec).unwrap());

        let cond = Condition {
            lhs_col: TabCol::new("t", "b"),
            op: CompOp::Eq,
            rhs: CondRhs::Val(Value::Str("ab".into())),
        };
        assert!(eval_cond(&cols, &cond, &rec).unwrap());

        let cond = Condition {
            lhs_col: TabCol::new("t", "a"),
            op: CompOp::Ne,
            rhs: CondRhs::Val(Value::Int(5)),
        };
        assert!(!eval_cond(&cols, &cond, &rec).unwrap());
    }

    #[test]
    fn test_eval_missing_column() {
        let cond = Condition {
            lhs_col: TabCol::bare("zzz"),
            op: CompOp::Eq,
            rhs: CondRhs::Val(Value::Int(0)),
        };
        let err = eval_cond(&cols(), &cond, &record(1, b"aaaa"));
        assert!(matches!(err, Err(Error::ColumnNotFound(_))));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let cond = Condition {
            lhs_col: TabCol::new("t", "a"),
            op: CompOp::Eq,
            rhs: CondRhs::Val(Value::Str("5".into())),
        };
        let err = eval_cond(&cols(), &cond, &record(5, b"aaaa"));
        assert!(matches!(err, Err(Error::IncompatibleType { .. })));
    }
}
