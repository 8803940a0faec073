//! System catalog
//!
//! Column types and values, table/index metadata, and the schema manager
//! that owns DDL, metadata persistence and the open file handles.

pub mod manager;
pub mod schema;
pub mod types;

pub use manager::SchemaManager;
pub use schema::{ColMeta, DbMeta, IndexMeta, TabMeta};
pub use types::{AggType, ColType, CompOp, SetOp, Value};
