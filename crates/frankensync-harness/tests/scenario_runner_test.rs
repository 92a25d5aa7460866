//! Integration test: scenario runner and log emitter wiring.

use std::io::Write;
use std::sync::{Arc, Mutex as StdMutex};

use frankensync_harness::ScenarioRunner;
use frankensync_harness::runner::SCENARIOS;
use frankensync_harness::structured_log::{LogEmitter, validate_log_line};

/// Writer that keeps what it was given so the test can read it back.
#[derive(Clone, Default)]
struct Captured(Arc<StdMutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn every_scenario_passes_on_active_backend() {
    let sink = Captured::default();
    let mut emitter = LogEmitter::to_writer(Box::new(sink.clone()), "scenarios", "unit");
    let summary = ScenarioRunner::new().run(&mut emitter).unwrap();

    let failures: Vec<_> = summary.results.iter().filter(|r| !r.passed()).collect();
    assert!(failures.is_empty(), "failed scenarios: {failures:#?}");
    assert_eq!(summary.results.len(), SCENARIOS.len());
    assert_eq!(summary.backend, frankensync_core::ACTIVE_BACKEND.name());

    let text = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
    let lines: Vec<_> = text.lines().collect();
    // run_start + one per scenario + run_end
    assert_eq!(lines.len(), SCENARIOS.len() + 2);
    for (i, line) in lines.iter().enumerate() {
        let entry = validate_log_line(line, i + 1).unwrap();
        assert_eq!(entry.trace_id, format!("scenarios::unit::{:03}", i + 1));
    }
}

#[test]
fn unmatched_filter_runs_nothing() {
    let mut emitter = LogEmitter::to_buffer("scenarios", "empty");
    let summary = ScenarioRunner::new()
        .with_filter("no_such_scenario")
        .run(&mut emitter)
        .unwrap();
    assert!(summary.results.is_empty());
    assert_eq!(summary.failed(), 0);
}
