#![allow(unsafe_code)]

use std::pin::pin;
use std::sync::Barrier;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use frankensync_core::backend::parking::ParkingMutex;
use frankensync_core::contract::MutexState;
use frankensync_core::{Mutex, MutexBackend, Unwind, catch_fault};

const OBSERVATION_WINDOW: Duration = Duration::from_millis(50);

fn mutual_exclusion<B: MutexBackend>() {
    const THREADS: usize = 8;
    const ITERATIONS: u64 = 2_000;

    let mut m = pin!(Mutex::<B, Unwind>::with_reporter(Unwind));
    m.as_mut().init().unwrap();
    let m = m.into_ref();

    // Split read-modify-write: lost updates show up if two threads overlap.
    let counter = AtomicU64::new(0);
    let inside = AtomicBool::new(false);
    let start = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                start.wait();
                for _ in 0..ITERATIONS {
                    let _held = m.lock_guard();
                    assert!(
                        !inside.swap(true, Ordering::Relaxed),
                        "two threads inside the critical section"
                    );
                    let v = counter.load(Ordering::Relaxed);
                    std::hint::spin_loop();
                    counter.store(v + 1, Ordering::Relaxed);
                    inside.store(false, Ordering::Relaxed);
                }
            });
        }
    });

    assert_eq!(counter.load(Ordering::Relaxed), THREADS as u64 * ITERATIONS);
}

fn holder_blocks_other_thread<B: MutexBackend>() {
    let mut m = pin!(Mutex::<B, Unwind>::with_reporter(Unwind));
    m.as_mut().init().unwrap();
    let m = m.into_ref();

    let acquired = AtomicBool::new(false);
    let attempting = Barrier::new(2);

    m.lock();
    thread::scope(|s| {
        s.spawn(|| {
            attempting.wait();
            m.lock();
            acquired.store(true, Ordering::SeqCst);
            // SAFETY: locked just above on this thread.
            unsafe { m.unlock() };
        });

        attempting.wait();
        thread::sleep(OBSERVATION_WINDOW);
        assert!(
            !acquired.load(Ordering::SeqCst),
            "second thread acquired a held mutex"
        );
        assert!(!m.try_lock(), "held mutex reported free");
        // SAFETY: locked by this thread before spawning.
        unsafe { m.unlock() };
    });

    assert!(acquired.load(Ordering::SeqCst));
    assert_eq!(m.state(), MutexState::Unlocked);
}

fn destroy_while_held_is_not_fatal<B: MutexBackend>() {
    let mut m = pin!(Mutex::<B, Unwind>::with_reporter(Unwind));
    m.as_mut().init().unwrap();
    assert!(m.as_ref().try_lock());
    assert_eq!(catch_fault(|| m.as_mut().destroy()), None);
    assert_eq!(m.state(), MutexState::Destroyed);
}

fn init_destroy_cycles<B: MutexBackend>() {
    let mut m = pin!(Mutex::<B, Unwind>::with_reporter(Unwind));
    for _ in 0..16 {
        m.as_mut().init().unwrap();
        m.as_ref().lock();
        // SAFETY: locked just above on this thread.
        unsafe { m.as_ref().unlock() };
        m.as_mut().destroy();
    }
    assert_eq!(m.state(), MutexState::Destroyed);
}

#[test]
fn parking_mutual_exclusion() {
    mutual_exclusion::<ParkingMutex>();
}

#[test]
fn parking_holder_blocks_other_thread() {
    holder_blocks_other_thread::<ParkingMutex>();
}

#[test]
fn parking_destroy_while_held_is_not_fatal() {
    destroy_while_held_is_not_fatal::<ParkingMutex>();
}

#[test]
fn parking_init_destroy_cycles() {
    init_destroy_cycles::<ParkingMutex>();
}

#[cfg(unix)]
mod pthread {
    use super::*;
    use frankensync_core::backend::pthread::PthreadMutex;

    #[test]
    fn pthread_mutual_exclusion() {
        mutual_exclusion::<PthreadMutex>();
    }

    #[test]
    fn pthread_holder_blocks_other_thread() {
        holder_blocks_other_thread::<PthreadMutex>();
    }

    #[test]
    fn pthread_destroy_while_held_is_not_fatal() {
        destroy_while_held_is_not_fatal::<PthreadMutex>();
    }

    #[test]
    fn pthread_init_destroy_cycles() {
        init_destroy_cycles::<PthreadMutex>();
    }
}

#[test]
fn default_mutex_uses_active_backend() {
    let mut m = pin!(Mutex::new());
    assert_eq!(m.backend(), frankensync_core::ACTIVE_BACKEND);
    m.as_mut().init().unwrap();
    drop(m.as_ref().lock_guard());
    m.as_mut().destroy();
}
