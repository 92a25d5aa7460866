//! CLI entrypoint for the frankensync harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use frankensync_core::{ACTIVE_BACKEND, SEMAPHORE_VALUE_MAX, fatal_policy};
use frankensync_harness::structured_log::{JsonlLogger, LogEmitter, validate_log_file};
use frankensync_harness::{HarnessError, ScenarioRunner, StressConfig, run_stress};

static LOGGER: JsonlLogger = JsonlLogger::new();

/// Verification tooling for frankensync.
#[derive(Debug, Parser)]
#[command(name = "frankensync-harness")]
#[command(about = "Scenario, stress and log tooling for frankensync")]
struct Cli {
    /// Forward library log records to stderr as JSONL.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the behavioural scenarios on the active backend.
    Scenarios {
        /// Output JSONL path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
        /// Run id used in every trace id.
        #[arg(long, default_value = "local")]
        trace_id: String,
        /// Only run scenarios whose name contains this string.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Hammer both primitives from many threads and print a JSON report.
    Stress {
        #[arg(long, default_value_t = 8)]
        threads: usize,
        #[arg(long, default_value_t = 10_000)]
        iterations: u64,
        /// Initial semaphore count.
        #[arg(long, default_value_t = 2)]
        permits: u32,
    },
    /// Describe the active backend as JSON.
    Backend,
    /// Validate a structured log file.
    ValidateLog {
        /// JSONL file to check.
        path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if cli.verbose && log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Debug);
    }

    match cli.command {
        Command::Scenarios {
            output,
            trace_id,
            filter,
        } => {
            let mut emitter = match &output {
                Some(path) => LogEmitter::to_file(path, "scenarios", &trace_id)?,
                None => LogEmitter::to_writer(Box::new(std::io::stdout()), "scenarios", &trace_id),
            };
            let mut runner = ScenarioRunner::new();
            if let Some(filter) = filter {
                runner = runner.with_filter(filter);
            }
            let summary = runner.run(&mut emitter)?;
            let failed = summary.failed();
            for result in summary.results.iter().filter(|r| !r.passed()) {
                eprintln!(
                    "FAIL {}: {}",
                    result.name,
                    result.message.as_deref().unwrap_or("no detail")
                );
            }
            eprintln!(
                "{} backend: {}/{} scenarios passed",
                summary.backend,
                summary.results.len() - failed,
                summary.results.len()
            );
            if failed > 0 {
                return Err(HarnessError::ScenarioFailed {
                    failed,
                    total: summary.results.len(),
                }
                .into());
            }
        }
        Command::Stress {
            threads,
            iterations,
            permits,
        } => {
            let report = run_stress(StressConfig {
                threads,
                iterations,
                permits,
            })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.passed() {
                return Err("stress invariants violated".into());
            }
        }
        Command::Backend => {
            let description = serde_json::json!({
                "backend": ACTIVE_BACKEND.name(),
                "native_semaphore": ACTIVE_BACKEND.has_native_semaphore(),
                "semaphore_value_max": SEMAPHORE_VALUE_MAX,
                "fatal_policy": fatal_policy().as_str(),
            });
            println!("{}", serde_json::to_string_pretty(&description)?);
        }
        Command::ValidateLog { path } => {
            let (lines, errors) = validate_log_file(&path)?;
            for err in &errors {
                eprintln!("{err}");
            }
            if !errors.is_empty() {
                return Err(HarnessError::InvalidLog {
                    path,
                    errors: errors.len(),
                }
                .into());
            }
            println!("{}: {lines} valid line(s)", path.display());
        }
    }

    Ok(())
}
