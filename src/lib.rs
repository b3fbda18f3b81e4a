//! sqldrill - a daily SQL drill trainer with its own embedded SQL engine
//!
//! This crate provides:
//! - A drill catalog loaded from JSON
//! - A playground that runs learner SQL against a drill's mock tables
//! - Per-day answer persistence and progress tracking
//! - The relational engine underneath (parser, planner, executors, MVCC storage)

pub mod answer;
pub mod catalog;
pub mod config;
pub mod error;
pub mod playground;
pub mod progress;
pub mod sql;
pub mod storage;
pub mod trainer;
