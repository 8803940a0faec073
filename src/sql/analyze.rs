//! Semantic analysis
//!
//! Resolves the parser's AST against the catalog: infers table qualifiers
//! for bare columns, type-checks predicates and SET clauses (widening INT
//! literals against BIGINT columns, converting DATETIME strings), and
//! validates INSERT value lists. The output `Query` is what the planner
//! works from.

use std::sync::Arc;

use crate::catalog::types::{ColType, SetOp, Value};
use crate::catalog::{SchemaManager, TabMeta};
use crate::error::{Error, Result};
use crate::executor::plan::{
    AggSpec, CondRhs, Condition, OrderBy, SetClause, TabCol, NO_LIMIT,
};
use crate::sql::ast::{AggDef, BinaryExpr, Expr, OrderByDef, SetClauseDef, Statement};

/// A statement with every column reference resolved and every literal
/// type-checked
#[derive(Debug, Clone)]
pub enum Query {
    Select {
        tables: Vec<String>,
        cols: Vec<TabCol>,
        aggs: Vec<AggSpec>,
        conds: Vec<Condition>,
        order: Vec<OrderBy>,
        limit: i32,
    },
    Insert {
        table: String,
        values: Vec<Value>,
    },
    Update {
        table: String,
        set_clauses: Vec<SetClause>,
        conds: Vec<Condition>,
    },
    Delete {
        table: String,
        conds: Vec<Condition>,
    },
    /// DDL and transaction control pass through unresolved.
    Ddl(Statement),
}

pub struct Analyzer {
    sm: Arc<SchemaManager>,
}

impl Analyzer {
    pub fn new(sm: Arc<SchemaManager>) -> Self {
        Self { sm }
    }

    pub fn analyze(&self, stmt: Statement) -> Result<Query> {
        match stmt {
            Statement::Select {
                aggs,
                cols,
                tables,
                conds,
                order,
                limit,
            } => self.analyze_select(aggs, cols, tables, conds, order, limit),
            Statement::Insert { table, values } => self.analyze_insert(table, values),
            Statement::Update {
                table,
                sets,
                conds,
            } => self.analyze_update(table, sets, conds),
            Statement::Delete { table, conds } => {
                let tabs = self.load_tables(std::slice::from_ref(&table))?;
                let conds = self.resolve_conds(&tabs, conds)?;
                Ok(Query::Delete { table, conds })
            }
            other => Ok(Query::Ddl(other)),
        }
    }

    fn analyze_select(
        &self,
        aggs: Vec<AggDef>,
        cols: Vec<TabCol>,
        tables: Vec<String>,
        conds: Vec<BinaryExpr>,
        order: Vec<OrderByDef>,
        limit: Option<i32>,
    ) -> Result<Query> {
        let tabs = self.load_tables(&tables)?;

        // SELECT * expands to every column of every table in order.
        let cols = if cols.is_empty() && aggs.is_empty() {
            tabs.iter()
                .flat_map(|t| t.cols.iter().map(|c| TabCol::new(&c.tab_name, &c.name)))
                .collect()
        } else {
            cols.into_iter()
                .map(|c| self.resolve_col(&tabs, c))
                .collect::<Result<Vec<_>>>()?
        };

        let aggs = aggs
            .into_iter()
            .map(|a| self.resolve_agg(&tabs, a))
            .collect::<Result<Vec<_>>>()?;

        let conds = self.resolve_conds(&tabs, conds)?;
        let order = order
            .into_iter()
            .map(|o| {
                Ok(OrderBy {
                    col: self.resolve_col(&tabs, o.col)?,
                    desc: o.desc,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Query::Select {
            tables,
            cols,
            aggs,
            conds,
            order,
            limit: limit.unwrap_or(NO_LIMIT),
        })
    }

    fn analyze_insert(&self, table: String, values: Vec<Value>) -> Result<Query> {
        let tab = self.sm.get_table(&table)?;
        if values.len() != tab.cols.len() {
            return Err(Error::InvalidValueCount {
                expected: tab.cols.len(),
                given: values.len(),
            });
        }
        let values = tab
            .cols
            .iter()
            .zip(values)
            .map(|(col, v)| v.coerce_to(col.ty))
            .collect::<Result<Vec<_>>>()?;
        Ok(Query::Insert { table, values })
    }

    fn analyze_update(
        &self,
        table: String,
        sets: Vec<SetClauseDef>,
        conds: Vec<BinaryExpr>,
    ) -> Result<Query> {
        let tabs = self.load_tables(std::slice::from_ref(&table))?;
        let tab = &tabs[0];

        let mut set_clauses = Vec::with_capacity(sets.len());
        for set in sets {
            let col = tab.get_col(&set.col_name)?;
            let rhs = set.rhs.coerce_to(col.ty)?;
            if set.op != SetOp::Assign
                && !matches!(col.ty, ColType::Int | ColType::Bigint | ColType::Float)
            {
                return Err(Error::IncompatibleType {
                    lhs: col.ty.to_string(),
                    rhs: "arithmetic update".to_string(),
                });
            }
            set_clauses.push(SetClause {
                lhs: TabCol::new(&table, &col.name),
                op: set.op,
                rhs,
            });
        }

        let conds = self.resolve_conds(&tabs, conds)?;
        Ok(Query::Update {
            table,
            set_clauses,
            conds,
        })
    }

    fn load_tables(&self, tables: &[String]) -> Result<Vec<TabMeta>> {
        tables.iter().map(|t| self.sm.get_table(t)).collect()
    }

    /// Fill in the table qualifier of a bare column, requiring it to exist
    /// in exactly one of the queried tables.
    fn resolve_col(&self, tabs: &[TabMeta], col: TabCol) -> Result<TabCol> {
        if !col.tab_name.is_empty() {
            let tab = tabs
                .iter()
                .find(|t| t.name == col.tab_name)
                .ok_or_else(|| Error::TableNotFound(col.tab_name.clone()))?;
            tab.get_col(&col.col_name)?;
            return Ok(col);
        }
        let mut owner = None;
        for tab in tabs {
            if tab.is_col(&col.col_name) {
                if owner.is_some() {
                    return Err(Error::AmbiguousColumn(col.col_name));
                }
                owner = Some(tab.name.clone());
            }
        }
        match owner {
            Some(tab_name) => Ok(TabCol::new(&tab_name, &col.col_name)),
            None => Err(Error::ColumnNotFound(col.col_name)),
        }
    }

    fn resolve_agg(&self, tabs: &[TabMeta], agg: AggDef) -> Result<AggSpec> {
        let col = match agg.col {
            Some(col) => Some(self.resolve_col(tabs, col)?),
            None => None,
        };
        Ok(AggSpec {
            agg: agg.agg,
            col,
            out_name: agg.alias,
        })
    }

    fn resolve_conds(&self, tabs: &[TabMeta], conds: Vec<BinaryExpr>) -> Result<Vec<Condition>> {
        conds
            .into_iter()
            .map(|c| self.resolve_cond(tabs, c))
            .collect()
    }

    fn resolve_cond(&self, tabs: &[TabMeta], cond: BinaryExpr) -> Result<Condition> {
        let lhs = self.resolve_col(tabs, cond.lhs)?;
        let lhs_meta = tabs
            .iter()
            .find(|t| t.name == lhs.tab_name)
            .unwrap()
            .get_col(&lhs.col_name)?
            .clone();

        let rhs = match cond.rhs {
            Expr::Value(v) => CondRhs::Val(v.coerce_to(lhs_meta.ty)?),
            Expr::Col(col) => {
                let rhs = self.resolve_col(tabs, col)?;
                let rhs_meta = tabs
                    .iter()
                    .find(|t| t.name == rhs.tab_name)
                    .unwrap()
                    .get_col(&rhs.col_name)?;
                if rhs_meta.ty != lhs_meta.ty {
                    return Err(Error::IncompatibleType {
                        lhs: lhs_meta.ty.to_string(),
                        rhs: rhs_meta.ty.to_string(),
                    });
                }
                CondRhs::Col(rhs)
            }
        };
        Ok(Condition {
            lhs_col: lhs,
            op: cond.op,
            rhs,
        })
    }
}
