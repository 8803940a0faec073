//! SQL front-end types
//!
//! Tokenizing and parsing happen in an external front-end; this module
//! defines the AST that front-end produces and the analyzer that resolves
//! it against the catalog into an executable `Query`.

pub mod analyze;
pub mod ast;

pub use analyze::{Analyzer, Query};
pub use ast::Statement;
