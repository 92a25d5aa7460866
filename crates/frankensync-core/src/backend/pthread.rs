//! POSIX threads backend.
//!
//! The mutex is a plain `pthread_mutex_t` with default attributes. The
//! semaphore is an unnamed `sem_t` where the platform supports `sem_init`;
//! Apple platforms only stub it out, so there the semaphore is emulated with a
//! `pthread_mutex_t`, a `pthread_cond_t` and a [`SemaphoreCounter`].

use std::cell::UnsafeCell;
use std::ptr;

use crate::backend::{BackendKind, MutexBackend, SemaphoreBackend};
use crate::contract::{NativeStatus, SemaphoreCounter, native_status, validate_initial_count};

// ---------------------------------------------------------------------------
// Mutex
// ---------------------------------------------------------------------------

/// `pthread_mutex_t` with default (NORMAL) attributes.
pub struct PthreadMutex {
    raw: UnsafeCell<libc::pthread_mutex_t>,
}

// SAFETY: the pthread mutex is designed for concurrent use from any thread;
// every access goes through the pthread API.
unsafe impl Send for PthreadMutex {}
// SAFETY: as above.
unsafe impl Sync for PthreadMutex {}

// SAFETY: pthread mutexes provide mutual exclusion with acquire/release
// ordering; callers uphold the lifecycle contract of `MutexBackend`.
unsafe impl MutexBackend for PthreadMutex {
    const KIND: BackendKind = BackendKind::Pthread;

    fn uninit() -> Self {
        Self {
            raw: UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER),
        }
    }

    unsafe fn init(&self) -> NativeStatus {
        // SAFETY: `raw` is valid storage at its final address (caller contract).
        native_status(unsafe { libc::pthread_mutex_init(self.raw.get(), ptr::null()) })
    }

    unsafe fn destroy(&self) -> NativeStatus {
        // SAFETY: initialised and no concurrent users (caller contract).
        native_status(unsafe { libc::pthread_mutex_destroy(self.raw.get()) })
    }

    unsafe fn lock(&self) -> NativeStatus {
        // SAFETY: initialised (caller contract).
        native_status(unsafe { libc::pthread_mutex_lock(self.raw.get()) })
    }

    unsafe fn try_lock(&self) -> Result<bool, i32> {
        // SAFETY: initialised (caller contract).
        match unsafe { libc::pthread_mutex_trylock(self.raw.get()) } {
            0 => Ok(true),
            libc::EBUSY => Ok(false),
            rc => Err(rc),
        }
    }

    unsafe fn unlock(&self) -> NativeStatus {
        // SAFETY: initialised and held by the caller (caller contract).
        native_status(unsafe { libc::pthread_mutex_unlock(self.raw.get()) })
    }
}

// ---------------------------------------------------------------------------
// Native semaphore
// ---------------------------------------------------------------------------

/// The semaphore the pthread backend uses on this target.
#[cfg(not(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "tvos",
    target_os = "watchos"
)))]
pub type PthreadSemaphore = native::PosixSemaphore;

/// The semaphore the pthread backend uses on this target.
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "tvos",
    target_os = "watchos"
))]
pub type PthreadSemaphore = CondvarSemaphore;

#[cfg(not(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "tvos",
    target_os = "watchos"
)))]
pub use native::PosixSemaphore;

#[cfg(not(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "tvos",
    target_os = "watchos"
)))]
mod native {
    use std::cell::UnsafeCell;

    use crate::backend::{BackendKind, SemaphoreBackend};
    use crate::contract::{NativeStatus, sem_status, validate_initial_count};
    use crate::errno;

    /// Unnamed, process-private `sem_t`.
    pub struct PosixSemaphore {
        raw: UnsafeCell<libc::sem_t>,
    }

    // SAFETY: `sem_t` is designed for concurrent use; all access goes through
    // the `sem_*` API.
    unsafe impl Send for PosixSemaphore {}
    // SAFETY: as above.
    unsafe impl Sync for PosixSemaphore {}

    // SAFETY: POSIX semaphores keep a non-negative count, `sem_wait` returns
    // only after decrementing, and `sem_post` wakes at most one waiter with
    // memory synchronisation.
    unsafe impl SemaphoreBackend for PosixSemaphore {
        const KIND: BackendKind = BackendKind::Pthread;

        fn uninit() -> Self {
            Self {
                // SAFETY: `sem_t` is plain C data; all-zero is a valid bit
                // pattern until `sem_init` runs.
                raw: UnsafeCell::new(unsafe { std::mem::zeroed() }),
            }
        }

        unsafe fn init(&self, initial: u32) -> NativeStatus {
            validate_initial_count(initial)?;
            // SAFETY: storage at its final address (caller contract).
            let rc = unsafe { libc::sem_init(self.raw.get(), 0, initial) };
            sem_status(rc, errno::last_errno())
        }

        unsafe fn destroy(&self) -> NativeStatus {
            // SAFETY: initialised, no waiters (caller contract).
            let rc = unsafe { libc::sem_destroy(self.raw.get()) };
            sem_status(rc, errno::last_errno())
        }

        unsafe fn down(&self) -> NativeStatus {
            loop {
                // SAFETY: initialised (caller contract).
                if unsafe { libc::sem_wait(self.raw.get()) } == 0 {
                    return Ok(());
                }
                match errno::last_errno() {
                    errno::EINTR => continue,
                    code => return Err(code),
                }
            }
        }

        unsafe fn try_down(&self) -> Result<bool, i32> {
            loop {
                // SAFETY: initialised (caller contract).
                if unsafe { libc::sem_trywait(self.raw.get()) } == 0 {
                    return Ok(true);
                }
                match errno::last_errno() {
                    errno::EINTR => continue,
                    errno::EAGAIN => return Ok(false),
                    code => return Err(code),
                }
            }
        }

        unsafe fn up(&self) -> NativeStatus {
            // SAFETY: initialised (caller contract).
            let rc = unsafe { libc::sem_post(self.raw.get()) };
            sem_status(rc, errno::last_errno())
        }

        unsafe fn value(&self) -> Result<u32, i32> {
            let mut out: libc::c_int = 0;
            // SAFETY: initialised (caller contract); `out` is a valid int.
            let rc = unsafe { libc::sem_getvalue(self.raw.get(), &mut out) };
            sem_status(rc, errno::last_errno())?;
            // POSIX allows a negative value to report the number of waiters.
            Ok(out.max(0) as u32)
        }
    }
}

// ---------------------------------------------------------------------------
// Emulated semaphore
// ---------------------------------------------------------------------------

/// Counting semaphore built from a pthread mutex and condition variable.
///
/// Compiled on every Unix target; it is the active semaphore on Apple
/// platforms.
pub struct CondvarSemaphore {
    mutex: UnsafeCell<libc::pthread_mutex_t>,
    cond: UnsafeCell<libc::pthread_cond_t>,
    counter: UnsafeCell<SemaphoreCounter>,
}

// SAFETY: `counter` is only touched while `mutex` is held; the pthread
// objects are thread-safe by design.
unsafe impl Send for CondvarSemaphore {}
// SAFETY: as above.
unsafe impl Sync for CondvarSemaphore {}

impl CondvarSemaphore {
    unsafe fn acquire(&self) -> NativeStatus {
        // SAFETY: initialised (caller contract).
        native_status(unsafe { libc::pthread_mutex_lock(self.mutex.get()) })
    }

    unsafe fn release(&self) -> NativeStatus {
        // SAFETY: held by this thread (caller contract).
        native_status(unsafe { libc::pthread_mutex_unlock(self.mutex.get()) })
    }

    /// The counter. Only valid while the internal mutex is held.
    #[allow(clippy::mut_from_ref)]
    unsafe fn counter(&self) -> &mut SemaphoreCounter {
        // SAFETY: the caller holds the mutex, so no other reference is live.
        unsafe { &mut *self.counter.get() }
    }
}

// SAFETY: the counter is guarded by the pthread mutex; down re-checks it in a
// loop around `pthread_cond_wait`, up signals one waiter (under the mutex)
// only when one is parked, and the mutex provides the acquire/release pairing.
unsafe impl SemaphoreBackend for CondvarSemaphore {
    const KIND: BackendKind = BackendKind::Pthread;

    fn uninit() -> Self {
        Self {
            mutex: UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER),
            cond: UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER),
            counter: UnsafeCell::new(SemaphoreCounter::new(0)),
        }
    }

    unsafe fn init(&self, initial: u32) -> NativeStatus {
        validate_initial_count(initial)?;
        // SAFETY: storage at its final address (caller contract).
        native_status(unsafe { libc::pthread_mutex_init(self.mutex.get(), ptr::null()) })?;
        // SAFETY: as above.
        let rc = unsafe { libc::pthread_cond_init(self.cond.get(), ptr::null()) };
        if rc != 0 {
            // SAFETY: initialised just above and never shared.
            let _ = unsafe { libc::pthread_mutex_destroy(self.mutex.get()) };
            return Err(rc);
        }
        // SAFETY: not yet shared with any other thread.
        unsafe { *self.counter.get() = SemaphoreCounter::new(initial) };
        Ok(())
    }

    unsafe fn destroy(&self) -> NativeStatus {
        // SAFETY: initialised, no waiters (caller contract).
        let cond = native_status(unsafe { libc::pthread_cond_destroy(self.cond.get()) });
        // SAFETY: as above.
        let mutex = native_status(unsafe { libc::pthread_mutex_destroy(self.mutex.get()) });
        cond.and(mutex)
    }

    unsafe fn down(&self) -> NativeStatus {
        // SAFETY: forwarded caller contract.
        unsafe { self.acquire() }?;
        loop {
            // SAFETY: mutex held (re-acquired by `pthread_cond_wait`).
            let counter = unsafe { self.counter() };
            if counter.try_take() {
                break;
            }
            counter.park();
            // SAFETY: mutex held by this thread; cond initialised.
            let rc = unsafe { libc::pthread_cond_wait(self.cond.get(), self.mutex.get()) };
            // SAFETY: `pthread_cond_wait` returns with the mutex held.
            unsafe { self.counter() }.unpark();
            if rc != 0 {
                // SAFETY: mutex held.
                let _ = unsafe { self.release() };
                return Err(rc);
            }
        }
        // SAFETY: mutex held.
        unsafe { self.release() }
    }

    unsafe fn try_down(&self) -> Result<bool, i32> {
        // SAFETY: forwarded caller contract.
        unsafe { self.acquire() }?;
        // SAFETY: mutex held.
        let taken = unsafe { self.counter() }.try_take();
        // SAFETY: mutex held.
        unsafe { self.release() }?;
        Ok(taken)
    }

    unsafe fn up(&self) -> NativeStatus {
        // SAFETY: forwarded caller contract.
        unsafe { self.acquire() }?;
        // SAFETY: mutex held.
        let signalled = match unsafe { self.counter() }.give() {
            // SAFETY: cond initialised; signalled under the mutex so the
            // parked waiter counted by `give` is the one woken.
            Ok(true) => native_status(unsafe { libc::pthread_cond_signal(self.cond.get()) }),
            Ok(false) => Ok(()),
            Err(code) => Err(code),
        };
        // SAFETY: mutex held.
        let released = unsafe { self.release() };
        signalled.and(released)
    }

    unsafe fn value(&self) -> Result<u32, i32> {
        // SAFETY: forwarded caller contract.
        unsafe { self.acquire() }?;
        // SAFETY: mutex held.
        let value = unsafe { self.counter() }.value();
        // SAFETY: mutex held.
        unsafe { self.release() }?;
        Ok(value)
    }
}
