//! Typed configuration from environment variables.
//!
//! Loads once at startup; everything has a sensible default so the CLI
//! works out of the box. In local dev, call `dotenvy::dotenv().ok()` first.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path.
    pub db_path: PathBuf,
    /// tracing filter directive (e.g. "info", "taskflow=debug").
    pub log_filter: String,
    /// Upper bound on the dashboard's live pending-verification list.
    pub pending_list_limit: i64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("TASKFLOW_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("taskflow.db")),
            log_filter: std::env::var("TASKFLOW_LOG").unwrap_or_else(|_| "info".to_string()),
            pending_list_limit: std::env::var("TASKFLOW_PENDING_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }
}
