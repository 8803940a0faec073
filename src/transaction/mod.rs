//! Transaction layer
//!
//! Two-phase locking with hierarchical table/record locks (no-wait deadlock
//! prevention), per-transaction undo via write records, and the transaction
//! manager driving begin/commit/abort.

pub mod lock_manager;
pub mod manager;
pub mod transaction;

pub use lock_manager::{LockDataId, LockManager, LockMode};
pub use manager::TransactionManager;
pub use transaction::{Transaction, TxnState, WriteKind, WriteRecord};
