//! Error types for FerroDB
//!
//! This module defines all error types used throughout the database engine.

use thiserror::Error;

/// The main error type for FerroDB
#[derive(Error, Debug)]
pub enum Error {
    // ========== Catalog Errors ==========
    #[error("Catalog error: table '{0}' already exists")]
    TableExists(String),

    #[error("Catalog error: table '{0}' not found")]
    TableNotFound(String),

    #[error("Catalog error: column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Catalog error: column '{0}' is ambiguous")]
    AmbiguousColumn(String),

    #[error("Catalog error: index on '{0}' ({1}) already exists")]
    IndexExists(String, String),

    #[error("Catalog error: index on '{0}' ({1}) not found")]
    IndexNotFound(String, String),

    // ========== Schema / Value Errors ==========
    #[error("Type error: incompatible types {lhs} and {rhs}")]
    IncompatibleType { lhs: String, rhs: String },

    #[error("Value error: expected {expected} values, got {given}")]
    InvalidValueCount { expected: usize, given: usize },

    #[error("Value error: invalid datetime '{0}'")]
    InvalidValue(String),

    #[error("Value error: string '{0}' exceeds column length {1}")]
    StringOverflow(String, usize),

    // ========== Index Errors ==========
    #[error("Index error: duplicate key on insert")]
    IndexInsertDuplicated,

    // ========== Storage / I/O Errors ==========
    #[error("Storage error: file '{0}' already exists")]
    FileExists(String),

    #[error("Storage error: file '{0}' not found")]
    FileNotFound(String),

    #[error("Storage error: page {0} does not exist")]
    PageNotExist(i32),

    #[error("Storage error: buffer pool has no evictable frame")]
    BufferPoolFull,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    // ========== Concurrency Errors ==========
    #[error("Transaction {0} requested a lock while shrinking")]
    LockOnShrinking(i32),

    #[error("Transaction {0} aborted to prevent deadlock")]
    DeadlockPrevention(i32),

    #[error("Transaction aborted: {0}")]
    TransactionAbort(String),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error must abort the whole transaction (not just the
    /// current statement).
    pub fn aborts_transaction(&self) -> bool {
        matches!(
            self,
            Error::DeadlockPrevention(_) | Error::LockOnShrinking(_) | Error::TransactionAbort(_)
        )
    }
}

/// Result type alias for FerroDB operations
pub type Result<T> = std::result::Result<T, Error>;
