//! Harness error type.

use std::path::PathBuf;

use frankensync_core::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("primitive setup failed: {0}")]
    Setup(#[from] SyncError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{failed} of {total} scenarios failed")]
    ScenarioFailed { failed: usize, total: usize },
    #[error("{path}: {errors} invalid line(s)")]
    InvalidLog { path: PathBuf, errors: usize },
}

pub type Result<T> = std::result::Result<T, HarnessError>;
