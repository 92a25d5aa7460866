//! Contention stress for both primitives.

use std::pin::pin;
use std::sync::Barrier;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use frankensync_core::{ACTIVE_BACKEND, Mutex, Semaphore};
use serde::Serialize;

use crate::error::{HarnessError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressConfig {
    pub threads: usize,
    pub iterations: u64,
    pub permits: u32,
}

impl StressConfig {
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(HarnessError::InvalidArgument(
                "--threads must be at least 1".to_string(),
            ));
        }
        if self.permits == 0 {
            return Err(HarnessError::InvalidArgument(
                "--permits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MutexStress {
    pub expected: u64,
    pub observed: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SemaphoreStress {
    pub permits: u32,
    /// Highest number of threads seen between `down` and `up` at once.
    pub max_in_flight: u32,
    pub final_value: u32,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub backend: &'static str,
    pub threads: usize,
    pub iterations: u64,
    pub mutex: MutexStress,
    pub semaphore: SemaphoreStress,
}

impl StressReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.mutex.observed == self.mutex.expected
            && self.semaphore.max_in_flight <= self.semaphore.permits
            && self.semaphore.final_value == self.semaphore.permits
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Run both stress phases with the default (aborting) reporter.
pub fn run_stress(config: StressConfig) -> Result<StressReport> {
    config.validate()?;
    Ok(StressReport {
        backend: ACTIVE_BACKEND.name(),
        threads: config.threads,
        iterations: config.iterations,
        mutex: stress_mutex(config)?,
        semaphore: stress_semaphore(config)?,
    })
}

fn stress_mutex(config: StressConfig) -> Result<MutexStress> {
    let mut mutex = pin!(Mutex::new());
    mutex.as_mut().init()?;
    let shared = mutex.as_ref();
    let counter = AtomicU64::new(0);
    let start = Barrier::new(config.threads);

    let started = Instant::now();
    thread::scope(|s| {
        let (counter, start) = (&counter, &start);
        for _ in 0..config.threads {
            s.spawn(move || {
                start.wait();
                for _ in 0..config.iterations {
                    let _held = shared.lock_guard();
                    let v = counter.load(Ordering::Relaxed);
                    counter.store(v + 1, Ordering::Relaxed);
                }
            });
        }
    });
    let elapsed_ms = elapsed_ms(started);
    mutex.as_mut().destroy();

    Ok(MutexStress {
        expected: config.threads as u64 * config.iterations,
        observed: counter.load(Ordering::Relaxed),
        elapsed_ms,
    })
}

fn stress_semaphore(config: StressConfig) -> Result<SemaphoreStress> {
    let sem = Semaphore::create(config.permits)?;
    let in_flight = AtomicU32::new(0);
    let max_in_flight = AtomicU32::new(0);
    let start = Barrier::new(config.threads);

    let started = Instant::now();
    thread::scope(|s| {
        let (sem, in_flight, max_in_flight, start) = (&sem, &in_flight, &max_in_flight, &start);
        for _ in 0..config.threads {
            s.spawn(move || {
                start.wait();
                for _ in 0..config.iterations {
                    sem.down();
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);
                    thread::yield_now();
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    sem.up();
                }
            });
        }
    });
    let elapsed_ms = elapsed_ms(started);
    let final_value = sem.value();
    sem.destroy();

    Ok(SemaphoreStress {
        permits: config.permits,
        max_in_flight: max_in_flight.load(Ordering::SeqCst),
        final_value,
        elapsed_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threads_is_rejected() {
        let err = run_stress(StressConfig {
            threads: 0,
            iterations: 1,
            permits: 1,
        })
        .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidArgument(_)));
    }

    #[test]
    fn small_run_passes() {
        let report = run_stress(StressConfig {
            threads: 4,
            iterations: 200,
            permits: 2,
        })
        .unwrap();
        assert!(report.passed(), "{report:?}");
        assert_eq!(report.mutex.expected, 800);
    }
}
