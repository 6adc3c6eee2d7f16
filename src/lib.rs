//! # taskflow
//!
//! Task-assignment workflow engine with a post-completion verification
//! gate and a batch performance-analytics layer.
//!
//! Three coupled cores: the status state machine with an append-only
//! history trail, the verification workflow that can force a completed
//! assignment back into revision, and the metrics aggregator that compiles
//! weighted per-subject and per-department snapshots for report views.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod storage;
