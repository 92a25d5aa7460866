//! Behavioural scenarios against the build's active backend.
//!
//! Each scenario sets up its own primitives with the [`Unwind`] reporter, so a
//! fault becomes a failed result instead of a dead process. Blocking is
//! observed through a fixed sleep window: a waiter that has not returned by the
//! end of the window is taken to be blocked.

use std::pin::pin;
use std::sync::Barrier;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

use frankensync_core::contract::MutexState;
use frankensync_core::{
    ACTIVE_BACKEND, ActiveMutex, ActiveSemaphore, Fault, Mutex, SEMAPHORE_VALUE_MAX, Semaphore,
    SyncError, Unwind, catch_fault,
};
use serde::Serialize;

use crate::error::Result;
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

type ScenarioMutex = Mutex<ActiveMutex, Unwind>;
type ScenarioSemaphore = Semaphore<ActiveSemaphore, Unwind>;

/// How long a thread must stay parked to count as blocked.
pub const OBSERVATION_WINDOW: Duration = Duration::from_millis(50);

/// Upper bound on waiting for a released thread to show progress.
const PROGRESS_DEADLINE: Duration = Duration::from_secs(5);

/// Why a scenario failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioFailure {
    pub message: String,
    pub errno: Option<i32>,
}

impl ScenarioFailure {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errno: None,
        }
    }
}

impl From<SyncError> for ScenarioFailure {
    fn from(err: SyncError) -> Self {
        Self {
            message: err.to_string(),
            errno: Some(err.errno()),
        }
    }
}

impl From<Fault> for ScenarioFailure {
    fn from(fault: Fault) -> Self {
        Self {
            message: fault.to_string(),
            errno: Some(fault.code),
        }
    }
}

type Verdict = std::result::Result<(), ScenarioFailure>;

/// A named check.
pub struct Scenario {
    pub name: &'static str,
    /// `mutex` or `semaphore`.
    pub primitive: &'static str,
    run: fn() -> Verdict,
}

/// Every scenario, in run order.
pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "mutex_mutual_exclusion",
        primitive: "mutex",
        run: mutex_mutual_exclusion,
    },
    Scenario {
        name: "mutex_holder_blocks_other",
        primitive: "mutex",
        run: mutex_holder_blocks_other,
    },
    Scenario {
        name: "mutex_try_lock_reports_busy",
        primitive: "mutex",
        run: mutex_try_lock_reports_busy,
    },
    Scenario {
        name: "mutex_destroy_while_held",
        primitive: "mutex",
        run: mutex_destroy_while_held,
    },
    Scenario {
        name: "mutex_reinit_after_destroy",
        primitive: "mutex",
        run: mutex_reinit_after_destroy,
    },
    Scenario {
        name: "semaphore_sixth_down_blocks",
        primitive: "semaphore",
        run: semaphore_sixth_down_blocks,
    },
    Scenario {
        name: "semaphore_each_up_releases_one",
        primitive: "semaphore",
        run: semaphore_each_up_releases_one,
    },
    Scenario {
        name: "semaphore_accounting",
        primitive: "semaphore",
        run: semaphore_accounting,
    },
    Scenario {
        name: "semaphore_oversized_count_refused",
        primitive: "semaphore",
        run: semaphore_oversized_count_refused,
    },
];

/// Outcome of one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub primitive: String,
    pub outcome: Outcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
}

impl ScenarioResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}

/// All results of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub backend: String,
    pub results: Vec<ScenarioResult>,
}

impl RunSummary {
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.passed()).count()
    }
}

/// Runs [`SCENARIOS`] and logs one entry per scenario.
pub struct ScenarioRunner {
    /// Restrict the run to scenario names containing this substring.
    pub filter: Option<String>,
}

impl ScenarioRunner {
    #[must_use]
    pub fn new() -> Self {
        Self { filter: None }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    fn selected(&self) -> impl Iterator<Item = &'static Scenario> + '_ {
        SCENARIOS.iter().filter(move |s| {
            self.filter
                .as_deref()
                .is_none_or(|needle| s.name.contains(needle))
        })
    }

    pub fn run(&self, emitter: &mut LogEmitter) -> Result<RunSummary> {
        let backend = ACTIVE_BACKEND.name();
        emitter.emit_entry(
            LogEntry::new("", LogLevel::Info, "run_start").with_backend(backend),
        )?;

        let mut results = Vec::new();
        for scenario in self.selected() {
            let result = execute(scenario);
            let mut entry = LogEntry::new(
                "",
                if result.passed() {
                    LogLevel::Info
                } else {
                    LogLevel::Error
                },
                "scenario_result",
            )
            .with_backend(backend)
            .with_scenario(scenario.name)
            .with_outcome(result.outcome)
            .with_duration_ms(result.duration_ms);
            if let Some(code) = result.errno {
                entry = entry.with_errno(code);
            }
            if let Some(message) = &result.message {
                entry = entry.with_details(serde_json::json!({ "message": message }));
            }
            emitter.emit_entry(entry)?;
            results.push(result);
        }

        let summary = RunSummary {
            backend: backend.to_string(),
            results,
        };
        emitter.emit_entry(
            LogEntry::new("", LogLevel::Info, "run_end")
                .with_backend(backend)
                .with_details(serde_json::json!({
                    "total": summary.results.len(),
                    "failed": summary.failed(),
                })),
        )?;
        emitter.flush()?;
        Ok(summary)
    }
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn execute(scenario: &Scenario) -> ScenarioResult {
    let started = Instant::now();
    let mut verdict = Ok(());
    if let Some(fault) = catch_fault(|| verdict = (scenario.run)()) {
        verdict = Err(fault.into());
    }
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let (outcome, message, errno) = match verdict {
        Ok(()) => (Outcome::Pass, None, None),
        Err(failure) => (Outcome::Fail, Some(failure.message), failure.errno),
    };
    ScenarioResult {
        name: scenario.name.to_string(),
        primitive: scenario.primitive.to_string(),
        outcome,
        duration_ms,
        message,
        errno,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn join<T>(handle: ScopedJoinHandle<'_, T>) -> std::result::Result<T, ScenarioFailure> {
    handle
        .join()
        .map_err(|payload| match payload.downcast::<Fault>() {
            Ok(fault) => ScenarioFailure::from(*fault),
            Err(_) => ScenarioFailure::new("worker thread panicked"),
        })
}

fn ensure(cond: bool, message: impl FnOnce() -> String) -> Verdict {
    if cond {
        Ok(())
    } else {
        Err(ScenarioFailure::new(message()))
    }
}

/// Poll `probe` until it holds or the deadline passes.
fn wait_until(probe: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + PROGRESS_DEADLINE;
    while !probe() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
    true
}

// ---------------------------------------------------------------------------
// Mutex scenarios
// ---------------------------------------------------------------------------

fn mutex_mutual_exclusion() -> Verdict {
    const THREADS: usize = 4;
    const ITERATIONS: u64 = 2_000;

    let mut mutex = pin!(ScenarioMutex::with_reporter(Unwind));
    mutex.as_mut().init()?;
    let shared = mutex.as_ref();
    let counter = AtomicU64::new(0);
    let start = Barrier::new(THREADS);

    thread::scope(|s| {
        let (counter, start) = (&counter, &start);
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(move || {
                    start.wait();
                    for _ in 0..ITERATIONS {
                        let _held = shared.lock_guard();
                        // Split load/store: lost updates show up without the lock.
                        let v = counter.load(Ordering::Relaxed);
                        counter.store(v + 1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        workers.into_iter().try_for_each(join)
    })?;
    mutex.as_mut().destroy();

    let total = counter.load(Ordering::Relaxed);
    let expected = THREADS as u64 * ITERATIONS;
    ensure(total == expected, || {
        format!("counter is {total}, expected {expected}")
    })
}

fn mutex_holder_blocks_other() -> Verdict {
    let mut mutex = pin!(ScenarioMutex::with_reporter(Unwind));
    mutex.as_mut().init()?;
    let shared = mutex.as_ref();
    let acquired = AtomicBool::new(false);

    let guard = shared.lock_guard();
    let blocked = thread::scope(|s| {
        let acquired = &acquired;
        let waiter = s.spawn(move || {
            let _held = shared.lock_guard();
            acquired.store(true, Ordering::SeqCst);
        });
        thread::sleep(OBSERVATION_WINDOW);
        let blocked = !acquired.load(Ordering::SeqCst);
        drop(guard);
        join(waiter).map(|()| blocked)
    })?;
    mutex.as_mut().destroy();

    ensure(blocked, || {
        "second locker got in while the lock was held".to_string()
    })?;
    ensure(acquired.load(Ordering::SeqCst), || {
        "second locker never acquired after unlock".to_string()
    })
}

fn mutex_try_lock_reports_busy() -> Verdict {
    let mut mutex = pin!(ScenarioMutex::with_reporter(Unwind));
    mutex.as_mut().init()?;
    let shared = mutex.as_ref();

    let guard = shared.lock_guard();
    let busy = thread::scope(|s| join(s.spawn(move || shared.try_lock_guard().is_none())))?;
    drop(guard);
    let free = shared.try_lock_guard().is_some();
    mutex.as_mut().destroy();

    ensure(busy, || "try-lock succeeded on a held mutex".to_string())?;
    ensure(free, || "try-lock failed on a free mutex".to_string())
}

fn mutex_destroy_while_held() -> Verdict {
    let mut mutex = pin!(ScenarioMutex::with_reporter(Unwind));
    mutex.as_mut().init()?;
    mutex.as_ref().lock();
    // A busy status from the backend is absorbed; a fault unwinds out of here.
    mutex.as_mut().destroy();
    let state = mutex.state();
    ensure(state == MutexState::Destroyed, || {
        format!("state after destroy is {state:?}")
    })
}

fn mutex_reinit_after_destroy() -> Verdict {
    let mut mutex = pin!(ScenarioMutex::with_reporter(Unwind));
    for round in 0..8 {
        mutex.as_mut().init()?;
        let taken = mutex.as_ref().try_lock_guard().is_some();
        mutex.as_mut().destroy();
        ensure(taken, || format!("round {round}: fresh mutex was busy"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Semaphore scenarios
// ---------------------------------------------------------------------------

fn semaphore_sixth_down_blocks() -> Verdict {
    let sem = ScenarioSemaphore::create_with(5, Unwind)?;
    for _ in 0..5 {
        sem.down();
    }
    let released = AtomicBool::new(false);

    let blocked = thread::scope(|s| {
        let (sem, released) = (&sem, &released);
        let waiter = s.spawn(move || {
            sem.down();
            released.store(true, Ordering::SeqCst);
        });
        thread::sleep(OBSERVATION_WINDOW);
        let blocked = !released.load(Ordering::SeqCst);
        sem.up();
        join(waiter).map(|()| blocked)
    })?;
    let left = sem.value();
    sem.destroy();

    ensure(blocked, || "sixth down returned with count zero".to_string())?;
    ensure(left == 0, || format!("count after release is {left}, expected 0"))
}

fn semaphore_each_up_releases_one() -> Verdict {
    let sem = ScenarioSemaphore::create_with(0, Unwind)?;
    let through = AtomicU32::new(0);

    let observed = thread::scope(|s| {
        let (sem, through) = (&sem, &through);
        let waiters: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(move || {
                    sem.down();
                    through.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        thread::sleep(OBSERVATION_WINDOW);
        let before = through.load(Ordering::SeqCst);
        sem.up();
        wait_until(|| through.load(Ordering::SeqCst) >= 1);
        thread::sleep(OBSERVATION_WINDOW);
        let after_one = through.load(Ordering::SeqCst);
        sem.up();
        waiters.into_iter().try_for_each(join)?;
        Ok::<_, ScenarioFailure>((before, after_one))
    })?;
    let left = sem.value();
    sem.destroy();

    let (before, after_one) = observed;
    ensure(before == 0, || format!("{before} waiter(s) passed a zero count"))?;
    ensure(after_one == 1, || {
        format!("one up released {after_one} waiter(s)")
    })?;
    ensure(through.load(Ordering::SeqCst) == 2, || {
        "second up did not release the remaining waiter".to_string()
    })?;
    ensure(left == 0, || format!("count after drain is {left}, expected 0"))
}

fn semaphore_accounting() -> Verdict {
    const INITIAL: u32 = 3;
    const UPS: u32 = 4;
    const DOWNS: u32 = 2;

    let sem = ScenarioSemaphore::create_with(INITIAL, Unwind)?;
    for _ in 0..UPS {
        sem.up();
    }
    for _ in 0..DOWNS {
        sem.down();
    }
    let value = sem.value();
    let expected = INITIAL + UPS - DOWNS;
    let mut taken = 0;
    while sem.try_down() {
        taken += 1;
    }
    sem.destroy();

    ensure(value == expected, || {
        format!("value is {value}, expected {expected}")
    })?;
    ensure(taken == expected, || {
        format!("try_down drained {taken}, expected {expected}")
    })
}

fn semaphore_oversized_count_refused() -> Verdict {
    let requested = SEMAPHORE_VALUE_MAX + 1;
    match ScenarioSemaphore::create_with(requested, Unwind) {
        Err(SyncError::CountOutOfRange { .. }) => Ok(()),
        Err(other) => Err(ScenarioFailure::new(format!(
            "expected count-out-of-range, got: {other}"
        ))),
        Ok(sem) => {
            sem.destroy();
            Err(ScenarioFailure::new(format!(
                "create({requested}) succeeded"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_names_are_unique() {
        let mut names: Vec<_> = SCENARIOS.iter().map(|s| s.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SCENARIOS.len());
    }

    #[test]
    fn filter_selects_by_substring() {
        let runner = ScenarioRunner::new().with_filter("semaphore_");
        assert!(runner.selected().all(|s| s.primitive == "semaphore"));
        assert_eq!(runner.selected().count(), 4);
    }

    #[test]
    fn fault_becomes_failure_with_errno() {
        let failure = ScenarioFailure::from(Fault::new(
            frankensync_core::FaultSite::SemaphoreUp,
            frankensync_core::errno::EOVERFLOW,
        ));
        assert_eq!(failure.errno, Some(frankensync_core::errno::EOVERFLOW));
    }

    #[test]
    fn accounting_passes_on_active_backend() {
        let result = execute(&SCENARIOS[7]);
        assert_eq!(result.name, "semaphore_accounting");
        assert!(result.passed(), "{result:?}");
    }
}
