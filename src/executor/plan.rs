//! Physical plan tree
//!
//! The shape produced by the (external) planner and consumed by the
//! executor factory, together with the predicate and clause types shared
//! with the analyzer.

use crate::catalog::types::{AggType, CompOp, SetOp, Value};

/// A possibly table-qualified column reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabCol {
    pub tab_name: String,
    pub col_name: String,
}

impl TabCol {
    pub fn new(tab_name: &str, col_name: &str) -> Self {
        Self {
            tab_name: tab_name.to_string(),
            col_name: col_name.to_string(),
        }
    }

    /// An unqualified column, resolved later by the analyzer.
    pub fn bare(col_name: &str) -> Self {
        Self::new("", col_name)
    }
}

/// Right-hand side of a predicate
#[derive(Debug, Clone)]
pub enum CondRhs {
    Val(Value),
    Col(TabCol),
}

/// One AND-connected predicate
#[derive(Debug, Clone)]
pub struct Condition {
    pub lhs_col: TabCol,
    pub op: CompOp,
    pub rhs: CondRhs,
}

impl Condition {
    /// An equality between columns of two different tables.
    pub fn is_join_eq(&self) -> bool {
        match &self.rhs {
            CondRhs::Col(rhs) => self.op == CompOp::Eq && rhs.tab_name != self.lhs_col.tab_name,
            CondRhs::Val(_) => false,
        }
    }
}

/// One UPDATE SET clause
#[derive(Debug, Clone)]
pub struct SetClause {
    pub lhs: TabCol,
    pub op: SetOp,
    pub rhs: Value,
}

/// One ORDER BY key
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub col: TabCol,
    pub desc: bool,
}

/// One aggregate output column
#[derive(Debug, Clone)]
pub struct AggSpec {
    pub agg: AggType,
    /// Aggregated column; `None` for COUNT(*)
    pub col: Option<TabCol>,
    pub out_name: String,
}

/// Sentinel for "no LIMIT clause"
pub const NO_LIMIT: i32 = -1000;

/// Physical plan node
#[derive(Debug, Clone)]
pub enum Plan {
    SeqScan {
        table: String,
        conds: Vec<Condition>,
    },
    IndexScan {
        table: String,
        conds: Vec<Condition>,
        index_cols: Vec<String>,
    },
    IndexRangeScan {
        table: String,
        conds: Vec<Condition>,
        index_cols: Vec<String>,
    },
    NestedLoopJoin {
        left: Box<Plan>,
        right: Box<Plan>,
        conds: Vec<Condition>,
    },
    BlockNestedLoopJoin {
        left: Box<Plan>,
        right: Box<Plan>,
        conds: Vec<Condition>,
    },
    HashJoin {
        left: Box<Plan>,
        right: Box<Plan>,
        conds: Vec<Condition>,
    },
    Projection {
        child: Box<Plan>,
        cols: Vec<TabCol>,
    },
    Sort {
        child: Box<Plan>,
        order: Vec<OrderBy>,
        limit: i32,
    },
    Aggregation {
        child: Box<Plan>,
        aggs: Vec<AggSpec>,
    },
    Insert {
        table: String,
        values: Vec<Value>,
    },
    Update {
        table: String,
        child: Box<Plan>,
        set_clauses: Vec<SetClause>,
    },
    Delete {
        table: String,
        child: Box<Plan>,
    },
    Select {
        child: Box<Plan>,
    },
}
