use std::sync::Barrier;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use frankensync_core::backend::parking::ParkingSemaphore;
use frankensync_core::{Semaphore, SemaphoreBackend, SyncError, Unwind};

const OBSERVATION_WINDOW: Duration = Duration::from_millis(50);
const WAKE_TIMEOUT: Duration = Duration::from_secs(10);

fn wait_until(label: &str, cond: impl Fn() -> bool) {
    let start = Instant::now();
    while !cond() {
        if start.elapsed() > WAKE_TIMEOUT {
            panic!("timeout waiting for {label}");
        }
        thread::yield_now();
    }
}

fn sixth_down_blocks_until_up<B: SemaphoreBackend>() {
    let sem = Semaphore::<B, Unwind>::create_with(5, Unwind).unwrap();
    for _ in 0..5 {
        sem.down();
    }
    assert_eq!(sem.value(), 0);

    let released = AtomicBool::new(false);
    thread::scope(|s| {
        s.spawn(|| {
            sem.down();
            released.store(true, Ordering::SeqCst);
        });

        thread::sleep(OBSERVATION_WINDOW);
        assert!(
            !released.load(Ordering::SeqCst),
            "down returned while the count was zero"
        );
        sem.up();
    });

    assert!(released.load(Ordering::SeqCst));
    assert_eq!(sem.value(), 0);
}

fn each_up_releases_one_waiter<B: SemaphoreBackend>() {
    let sem = Semaphore::<B, Unwind>::create_with(0, Unwind).unwrap();
    let released = AtomicU32::new(0);

    thread::scope(|s| {
        for _ in 0..2 {
            s.spawn(|| {
                sem.down();
                released.fetch_add(1, Ordering::SeqCst);
            });
        }

        thread::sleep(OBSERVATION_WINDOW);
        assert_eq!(released.load(Ordering::SeqCst), 0);

        sem.up();
        wait_until("first waiter", || released.load(Ordering::SeqCst) >= 1);
        thread::sleep(OBSERVATION_WINDOW);
        assert_eq!(
            released.load(Ordering::SeqCst),
            1,
            "one up released more than one waiter"
        );

        sem.up();
    });

    assert_eq!(released.load(Ordering::SeqCst), 2);
    assert_eq!(sem.value(), 0);
}

fn count_is_initial_plus_ups_minus_downs<B: SemaphoreBackend>() {
    const THREADS: usize = 6;
    const ROUNDS: u64 = 1_000;
    const INITIAL: u32 = 3;

    let sem = Semaphore::<B, Unwind>::create_with(INITIAL, Unwind).unwrap();
    let ups = AtomicU64::new(0);
    let downs = AtomicU64::new(0);
    let start = Barrier::new(THREADS);

    thread::scope(|s| {
        for t in 0..THREADS {
            let (sem, ups, downs, start) = (&sem, &ups, &downs, &start);
            s.spawn(move || {
                start.wait();
                for round in 0..ROUNDS {
                    if (round + t as u64) % 3 == 0 {
                        sem.up();
                        ups.fetch_add(1, Ordering::Relaxed);
                    } else if sem.try_down() {
                        downs.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    let expected = u64::from(INITIAL) + ups.load(Ordering::Relaxed) - downs.load(Ordering::Relaxed);
    assert_eq!(u64::from(sem.value()), expected);

    // Draining exactly `expected` permits leaves nothing behind.
    for _ in 0..expected {
        assert!(sem.try_down());
    }
    assert!(!sem.try_down());
}

fn blocked_downs_drain_in_any_order<B: SemaphoreBackend>() {
    const WAITERS: usize = 4;

    let sem = Semaphore::<B, Unwind>::create_with(0, Unwind).unwrap();
    let released = AtomicU32::new(0);

    thread::scope(|s| {
        for _ in 0..WAITERS {
            s.spawn(|| {
                sem.down();
                released.fetch_add(1, Ordering::SeqCst);
            });
        }
        for _ in 0..WAITERS {
            sem.up();
        }
    });

    assert_eq!(released.load(Ordering::SeqCst), WAITERS as u32);
    assert_eq!(sem.value(), 0);
}

fn oversized_initial_count_is_an_error<B: SemaphoreBackend>() {
    let err = Semaphore::<B, Unwind>::create_with(u32::MAX, Unwind).unwrap_err();
    assert!(matches!(err, SyncError::CountOutOfRange { .. }));
}

macro_rules! semaphore_suite {
    ($module:ident, $backend:ty) => {
        mod $module {
            use super::*;

            #[test]
            fn sixth_down_blocks_until_up() {
                super::sixth_down_blocks_until_up::<$backend>();
            }

            #[test]
            fn each_up_releases_one_waiter() {
                super::each_up_releases_one_waiter::<$backend>();
            }

            #[test]
            fn count_is_initial_plus_ups_minus_downs() {
                super::count_is_initial_plus_ups_minus_downs::<$backend>();
            }

            #[test]
            fn blocked_downs_drain_in_any_order() {
                super::blocked_downs_drain_in_any_order::<$backend>();
            }

            #[test]
            fn oversized_initial_count_is_an_error() {
                super::oversized_initial_count_is_an_error::<$backend>();
            }
        }
    };
}

semaphore_suite!(parking, ParkingSemaphore);

#[cfg(unix)]
semaphore_suite!(pthread_native, frankensync_core::backend::pthread::PthreadSemaphore);

#[cfg(unix)]
semaphore_suite!(pthread_condvar, frankensync_core::backend::pthread::CondvarSemaphore);

#[test]
fn default_semaphore_uses_active_backend() {
    let sem = Semaphore::create(2).unwrap();
    assert_eq!(sem.backend(), frankensync_core::ACTIVE_BACKEND);
    assert!(sem.try_down());
    sem.destroy();
}
