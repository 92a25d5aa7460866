//! Verification harness for frankensync.
//!
//! This crate provides:
//! - Behavioural scenarios run against the build's active backend
//! - Contention stress with a machine-readable report
//! - Structured JSONL logging and log validation

#![forbid(unsafe_code)]

pub mod error;
pub mod runner;
pub mod stress;
pub mod structured_log;

pub use error::HarnessError;
pub use runner::{RunSummary, ScenarioResult, ScenarioRunner};
pub use stress::{StressConfig, StressReport, run_stress};
