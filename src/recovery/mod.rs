//! Crash recovery
//!
//! WAL-driven analysis/redo/undo plus full index rebuild, run once at
//! startup before the catalog is handed to users.

pub mod recovery;

pub use recovery::RecoveryManager;
