//! Abstract syntax tree
//!
//! Statement shapes as produced by the parser: column references may be
//! unqualified, literals are untyped against the schema, and DATETIME
//! values are still plain strings. The analyzer resolves all of that.

use crate::catalog::types::{AggType, ColType, CompOp, SetOp, Value};
use crate::executor::plan::TabCol;

/// One column definition in CREATE TABLE
#[derive(Debug, Clone)]
pub struct ColDef {
    pub name: String,
    pub ty: ColType,
    /// Declared length; only meaningful for CHAR(n)
    pub len: usize,
}

/// A WHERE-clause operand
#[derive(Debug, Clone)]
pub enum Expr {
    Value(Value),
    Col(TabCol),
}

/// One binary comparison in an AND-connected WHERE clause
#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub lhs: TabCol,
    pub op: CompOp,
    pub rhs: Expr,
}

/// One SET clause in UPDATE
#[derive(Debug, Clone)]
pub struct SetClauseDef {
    pub col_name: String,
    pub op: SetOp,
    pub rhs: Value,
}

/// One ORDER BY key
#[derive(Debug, Clone)]
pub struct OrderByDef {
    pub col: TabCol,
    pub desc: bool,
}

/// One aggregate in a SELECT list
#[derive(Debug, Clone)]
pub struct AggDef {
    pub agg: AggType,
    /// `None` for COUNT(*)
    pub col: Option<TabCol>,
    pub alias: String,
}

#[derive(Debug, Clone)]
pub enum Statement {
    CreateTable {
        table: String,
        cols: Vec<ColDef>,
    },
    DropTable {
        table: String,
    },
    CreateIndex {
        table: String,
        cols: Vec<String>,
    },
    DropIndex {
        table: String,
        cols: Vec<String>,
    },
    ShowTables,
    ShowIndex {
        table: String,
    },
    DescTable {
        table: String,
    },
    Load {
        table: String,
        path: String,
    },
    Insert {
        table: String,
        values: Vec<Value>,
    },
    Delete {
        table: String,
        conds: Vec<BinaryExpr>,
    },
    Update {
        table: String,
        sets: Vec<SetClauseDef>,
        conds: Vec<BinaryExpr>,
    },
    Select {
        aggs: Vec<AggDef>,
        cols: Vec<TabCol>,
        tables: Vec<String>,
        conds: Vec<BinaryExpr>,
        order: Vec<OrderByDef>,
        limit: Option<i32>,
    },
    Begin,
    Commit,
    Abort,
    Rollback,
}
