//! SQL processing module
//!
//! This module provides:
//! - `parser`: SQL lexer and parser
//! - `types`: values, rows and column labels
//! - `schema`: table and column definitions
//! - `plan`: plan node tree built from a statement
//! - `executor`: query and mutation execution
//! - `engine`: SQL engine over MVCC key/value storage

pub mod parser;
pub mod types;
pub mod schema;
pub mod plan;
pub mod executor;
pub mod engine;
