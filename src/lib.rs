//! FerroDB - a single-node relational database engine written in Rust
//!
//! This library provides the core storage and execution stack:
//! - Page-oriented storage (disk manager, buffer pool with LRU eviction)
//! - Record heap files (bitmap-tracked slotted pages)
//! - Concurrent B+tree indexes with latch coupling
//! - Two-phase locking transactions with WAL-based crash recovery
//! - Volcano-model query executors
//!
//! SQL parsing and plan selection live in external front-ends; this crate
//! consumes their AST (`sql::ast`) and plan tree (`executor::plan`).

pub mod catalog;
pub mod context;
pub mod error;
pub mod executor;
pub mod recovery;
pub mod sql;
pub mod storage;
pub mod transaction;

pub use context::Context;
pub use error::{Error, Result};
