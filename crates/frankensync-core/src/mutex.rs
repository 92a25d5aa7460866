//! Inline mutex façade.
//!
//! [`Mutex`] is the native lock object plus a one-byte lifecycle word. The word
//! is driven by [`mutex_transition`], which turns what the primitives leave
//! undefined (locking never-initialised storage, unlocking an unlocked mutex)
//! into a fatal report instead.
//!
//! The value is address-sensitive once initialised (a `pthread_mutex_t` must
//! not move), so every operation after construction goes through [`Pin`].
//!
//! ```
//! use std::pin::pin;
//! use frankensync_core::Mutex;
//!
//! let mut m = pin!(Mutex::new());
//! m.as_mut().init().unwrap();
//! {
//!     let _held = m.as_ref().lock_guard();
//! }
//! m.as_mut().destroy();
//! ```

use std::marker::{PhantomData, PhantomPinned};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::backend::{ActiveMutex, BackendKind, MutexBackend};
use crate::contract::{
    DestroyDisposition, MutexOp, MutexOutcome, MutexState, MutexVerdict, classify_destroy_status,
    mutex_transition,
};
use crate::error::SyncError;
use crate::fatal::{FatalReporter, Fault, FaultSite, ProcessAbort};

/// Non-recursive mutual-exclusion lock over backend `B`.
///
/// Faults are handed to `R`. Both parameters default to the build's choice, so
/// plain `Mutex` is what callers normally name.
pub struct Mutex<B: MutexBackend = ActiveMutex, R: FatalReporter = ProcessAbort> {
    state: AtomicU8,
    raw: B,
    reporter: R,
    _pinned: PhantomPinned,
}

impl Mutex {
    /// Uninitialised storage for the build's backend. Call [`Mutex::init`]
    /// after pinning.
    #[must_use]
    pub fn new() -> Self {
        Self::with_reporter(ProcessAbort)
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: MutexBackend, R: FatalReporter> Mutex<B, R> {
    #[must_use]
    pub fn with_reporter(reporter: R) -> Self {
        Self {
            state: AtomicU8::new(MutexState::Uninitialized.as_u8()),
            raw: B::uninit(),
            reporter,
            _pinned: PhantomPinned,
        }
    }

    #[must_use]
    pub fn backend(&self) -> BackendKind {
        B::KIND
    }

    /// Current lifecycle state. Racy while other threads hold references.
    #[must_use]
    pub fn state(&self) -> MutexState {
        MutexState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, next: MutexState) {
        self.state.store(next.as_u8(), Ordering::Release);
    }

    /// Look up the transition for `op`; misuse never returns.
    fn admit(&self, op: MutexOp, site: FaultSite) -> MutexOutcome {
        let out = mutex_transition(self.state(), op);
        if let MutexVerdict::Misuse(code) = out.verdict {
            self.reporter.fatal(Fault::new(site, code));
        }
        out
    }

    /// Prepare the backend object.
    ///
    /// Fails with [`SyncError::AlreadyInitialized`] on a live mutex, or with
    /// [`SyncError::MutexInit`] when the backend is out of resources. A
    /// destroyed mutex may be initialised again.
    pub fn init(self: Pin<&mut Self>) -> Result<(), SyncError> {
        let this = self.into_ref().get_ref();
        let out = this.admit(MutexOp::Init, FaultSite::MutexInit);
        if let MutexVerdict::Refused(_) = out.verdict {
            return Err(SyncError::AlreadyInitialized);
        }
        // SAFETY: pinned, so the storage stays put until destroy; exclusive
        // access through `Pin<&mut Self>`.
        if let Err(code) = unsafe { this.raw.init() } {
            log::warn!(target: "frankensync", "{} mutex init failed: errno {code}", B::KIND);
            return Err(SyncError::MutexInit {
                backend: B::KIND,
                code,
            });
        }
        this.set_state(out.next);
        Ok(())
    }

    /// Release backend resources. Also run by `Drop`.
    ///
    /// A busy, again or in-progress status from the backend is absorbed.
    /// Destroying storage that was never initialised does nothing.
    pub fn destroy(self: Pin<&mut Self>) {
        self.into_ref().get_ref().teardown();
    }

    fn teardown(&self) {
        let out = mutex_transition(self.state(), MutexOp::Destroy);
        if out.verdict == MutexVerdict::Ignore {
            return;
        }
        // SAFETY: initialised (state says so); exclusive access through
        // `Pin<&mut Self>` or `&mut self` in drop.
        let code = match unsafe { self.raw.destroy() } {
            Ok(()) => 0,
            Err(code) => code,
        };
        // Marked dead before any report so a later drop does not retry.
        self.set_state(out.next);
        match classify_destroy_status(code) {
            DestroyDisposition::Destroyed => {}
            DestroyDisposition::TolerableRace => {
                log::debug!(
                    target: "frankensync",
                    "{} mutex destroy raced (errno {code}); ignored",
                    B::KIND
                );
            }
            DestroyDisposition::Fatal => {
                self.reporter.fatal(Fault::new(FaultSite::MutexDestroy, code));
            }
        }
    }

    /// Block until this thread holds the lock.
    ///
    /// Relocking from the holder deadlocks, or is fatal with `EDEADLK` on a
    /// backend that detects it (Win32). Backend errors are fatal.
    pub fn lock(self: Pin<&Self>) {
        let this = self.get_ref();
        let out = this.admit(MutexOp::Lock, FaultSite::MutexLock);
        // SAFETY: initialised (admitted) and pinned.
        if let Err(code) = unsafe { this.raw.lock() } {
            this.reporter.fatal(Fault::new(FaultSite::MutexLock, code));
        }
        this.set_state(out.next);
    }

    /// Take the lock if it is free. `false` when another holder has it.
    #[must_use]
    pub fn try_lock(self: Pin<&Self>) -> bool {
        let this = self.get_ref();
        this.admit(MutexOp::TryLock, FaultSite::MutexTryLock);
        // SAFETY: initialised (admitted) and pinned.
        match unsafe { this.raw.try_lock() } {
            Ok(true) => {
                this.set_state(MutexState::Locked);
                true
            }
            Ok(false) => false,
            Err(code) => this.reporter.fatal(Fault::new(FaultSite::MutexTryLock, code)),
        }
    }

    /// Release the lock.
    ///
    /// Unlocking a mutex that is observably unlocked is fatal.
    ///
    /// # Safety
    ///
    /// The calling thread must hold the lock, acquired through [`Mutex::lock`]
    /// or a successful [`Mutex::try_lock`].
    pub unsafe fn unlock(self: Pin<&Self>) {
        let this = self.get_ref();
        let out = this.admit(MutexOp::Unlock, FaultSite::MutexUnlock);
        // Stored before the release so the next holder's `Locked` wins.
        this.set_state(out.next);
        // SAFETY: held by the caller (function contract).
        if let Err(code) = unsafe { this.raw.unlock() } {
            this.reporter.fatal(Fault::new(FaultSite::MutexUnlock, code));
        }
    }

    /// Lock and return a guard that unlocks on drop.
    pub fn lock_guard(self: Pin<&Self>) -> MutexGuard<'_, B, R> {
        self.lock();
        MutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_lock_guard(self: Pin<&Self>) -> Option<MutexGuard<'_, B, R>> {
        if self.try_lock() {
            Some(MutexGuard {
                mutex: self,
                _not_send: PhantomData,
            })
        } else {
            None
        }
    }
}

impl<B: MutexBackend, R: FatalReporter> Drop for Mutex<B, R> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<B: MutexBackend, R: FatalReporter> std::fmt::Debug for Mutex<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutex")
            .field("backend", &B::KIND)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Proof of holding a [`Mutex`]; unlocks when dropped.
///
/// The unlock must run on the locking thread, so the guard is not `Send`:
///
/// ```compile_fail
/// use std::pin::pin;
/// use frankensync_core::Mutex;
///
/// let mut m = pin!(Mutex::new());
/// m.as_mut().init().unwrap();
/// let shared = m.as_ref();
/// std::thread::scope(|s| {
///     let held = shared.lock_guard();
///     s.spawn(move || drop(held));
/// });
/// ```
#[must_use = "the mutex unlocks as soon as the guard is dropped"]
pub struct MutexGuard<'a, B: MutexBackend = ActiveMutex, R: FatalReporter = ProcessAbort> {
    mutex: Pin<&'a Mutex<B, R>>,
    _not_send: PhantomData<*const ()>,
}

impl<B: MutexBackend, R: FatalReporter> Drop for MutexGuard<'_, B, R> {
    fn drop(&mut self) {
        // SAFETY: the guard exists only while this thread holds the lock.
        unsafe { self.mutex.unlock() };
    }
}
