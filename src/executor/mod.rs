//! Query execution
//!
//! Volcano-model operators composed from a `Plan` tree: scans over the
//! storage layer, joins, projection, sort, aggregation, and the DML
//! executors that drive heap and index mutations.

pub mod aggregation;
pub mod block_nested_loop_join;
pub mod delete;
pub mod executor;
pub mod hash_join;
pub mod index_range_scan;
pub mod index_scan;
pub mod insert;
pub mod nested_loop_join;
pub mod plan;
pub mod projection;
pub mod seq_scan;
pub mod sort;
pub mod update;

pub use executor::{eval_cond, eval_conds, find_col, Executor, Record};
pub use plan::{AggSpec, CondRhs, Condition, OrderBy, Plan, SetClause, TabCol, NO_LIMIT};

use std::sync::Arc;

use crate::catalog::schema::ColMeta;
use crate::catalog::SchemaManager;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::storage::Rid;

use aggregation::AggregationExecutor;
use block_nested_loop_join::BlockNestedLoopJoinExecutor;
use delete::DeleteExecutor;
use hash_join::HashJoinExecutor;
use index_range_scan::IndexRangeScanExecutor;
use index_scan::IndexScanExecutor;
use insert::InsertExecutor;
use nested_loop_join::NestedLoopJoinExecutor;
use projection::{ProjectionExecutor, ProjectionNocopyExecutor};
use seq_scan::SeqScanExecutor;
use sort::SortExecutor;
use update::UpdateExecutor;

/// Outcome of running one plan
#[derive(Debug, Default)]
pub struct ExecutionResult {
    pub cols: Vec<ColMeta>,
    pub rows: Vec<Record>,
    pub affected: usize,
}

/// Build the operator tree for a row-producing plan.
pub fn build_executor(
    sm: &Arc<SchemaManager>,
    ctx: &Context,
    plan: &Plan,
) -> Result<Box<dyn Executor>> {
    Ok(match plan {
        Plan::SeqScan { table, conds } => Box::new(SeqScanExecutor::new(
            sm,
            table,
            conds.clone(),
            ctx.clone(),
        )?),
        Plan::IndexScan {
            table,
            conds,
            index_cols,
        } => Box::new(IndexScanExecutor::new(
            sm,
            table,
            conds.clone(),
            index_cols,
            ctx.clone(),
        )?),
        Plan::IndexRangeScan {
            table,
            conds,
            index_cols,
        } => Box::new(IndexRangeScanExecutor::new(
            sm,
            table,
            conds.clone(),
            index_cols,
            ctx.clone(),
        )?),
        Plan::NestedLoopJoin { left, right, conds } => Box::new(NestedLoopJoinExecutor::new(
            build_executor(sm, ctx, left)?,
            build_executor(sm, ctx, right)?,
            conds.clone(),
        )),
        Plan::BlockNestedLoopJoin { left, right, conds } => {
            Box::new(BlockNestedLoopJoinExecutor::new(
                build_executor(sm, ctx, left)?,
                build_executor(sm, ctx, right)?,
                conds.clone(),
            ))
        }
        Plan::HashJoin { left, right, conds } => Box::new(HashJoinExecutor::new(
            build_executor(sm, ctx, left)?,
            build_executor(sm, ctx, right)?,
            conds.clone(),
        )?),
        Plan::Projection { child, cols } => {
            let child = build_executor(sm, ctx, child)?;
            if ProjectionExecutor::is_identity_prefix(child.as_ref(), cols) {
                Box::new(ProjectionNocopyExecutor::new(child, cols)?)
            } else {
                Box::new(ProjectionExecutor::new(child, cols)?)
            }
        }
        Plan::Sort {
            child,
            order,
            limit,
        } => Box::new(SortExecutor::new(
            build_executor(sm, ctx, child)?,
            order.clone(),
            *limit,
        )),
        Plan::Aggregation { child, aggs } => Box::new(AggregationExecutor::new(
            build_executor(sm, ctx, child)?,
            aggs.clone(),
        )?),
        Plan::Select { child } => build_executor(sm, ctx, child)?,
        Plan::Insert { .. } | Plan::Update { .. } | Plan::Delete { .. } => {
            return Err(Error::Internal(
                "DML plans are driven by execute_plan".to_string(),
            ))
        }
    })
}

/// Run a plan to completion: DML returns an affected-row count, queries
/// return materialized rows.
pub fn execute_plan(
    sm: &Arc<SchemaManager>,
    ctx: &Context,
    plan: &Plan,
) -> Result<ExecutionResult> {
    match plan {
        Plan::Insert { table, values } => {
            let mut exec = InsertExecutor::new(sm, table, values.clone(), ctx.clone())?;
            exec.execute()?;
            Ok(ExecutionResult {
                affected: 1,
                ..Default::default()
            })
        }
        Plan::Delete { table, child } => {
            let rids = collect_rids(sm, ctx, child)?;
            let mut exec = DeleteExecutor::new(sm, table, rids, ctx.clone())?;
            let affected = exec.execute()?;
            Ok(ExecutionResult {
                affected,
                ..Default::default()
            })
        }
        Plan::Update {
            table,
            child,
            set_clauses,
        } => {
            let rids = collect_rids(sm, ctx, child)?;
            let mut exec =
                UpdateExecutor::new(sm, table, rids, set_clauses.clone(), ctx.clone())?;
            let affected = exec.execute()?;
            Ok(ExecutionResult {
                affected,
                ..Default::default()
            })
        }
        other => {
            let mut exec = build_executor(sm, ctx, other)?;
            let mut rows = Vec::new();
            exec.begin_tuple()?;
            while !exec.is_end() {
                rows.push(exec.next()?);
                exec.next_tuple()?;
            }
            Ok(ExecutionResult {
                cols: exec.columns().to_vec(),
                rows,
                affected: 0,
            })
        }
    }
}

/// Run a scan sub-plan and collect the rids it produces (DML input).
fn collect_rids(sm: &Arc<SchemaManager>, ctx: &Context, plan: &Plan) -> Result<Vec<Rid>> {
    let mut exec = build_executor(sm, ctx, plan)?;
    let mut rids = Vec::new();
    exec.begin_tuple()?;
    while !exec.is_end() {
        rids.push(exec.rid());
        exec.next_tuple()?;
    }
    Ok(rids)
}
