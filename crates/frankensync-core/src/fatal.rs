//! Fatal-error collaborator.
//!
//! Lock, unlock, down and up cannot fail from the caller's point of view. When
//! the backend reports something the contract has no answer for, the fault is
//! handed to a [`FatalReporter`] which never returns. The reporter is a type
//! parameter of [`Mutex`](crate::Mutex) and [`Semaphore`](crate::Semaphore), so
//! it costs nothing in the default build and tests can substitute [`Unwind`].

use std::fmt;

use crate::config::{self, FatalPolicy};
use crate::errno;

/// Where a fault was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultSite {
    MutexInit,
    MutexDestroy,
    MutexLock,
    MutexTryLock,
    MutexUnlock,
    SemaphoreDown,
    SemaphoreTryDown,
    SemaphoreUp,
    SemaphoreValue,
    /// A null handle crossed the C boundary.
    AbiNullHandle,
}

impl FaultSite {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::MutexInit => "failed to initialise mutex",
            Self::MutexDestroy => "failed to destroy mutex",
            Self::MutexLock => "failed to lock mutex",
            Self::MutexTryLock => "failed to try-lock mutex",
            Self::MutexUnlock => "failed to unlock mutex",
            Self::SemaphoreDown => "failed to count down semaphore",
            Self::SemaphoreTryDown => "failed to try counting down semaphore",
            Self::SemaphoreUp => "failed to increment semaphore",
            Self::SemaphoreValue => "failed to read semaphore value",
            Self::AbiNullHandle => "null synchronization handle",
        }
    }
}

/// An unrecoverable primitive failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fault {
    pub site: FaultSite,
    /// Backend error number (errno-style, or a mapped Win32 code).
    pub code: i32,
}

impl Fault {
    #[must_use]
    pub const fn new(site: FaultSite, code: i32) -> Self {
        Self { site, code }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (code {} {})",
            self.site.message(),
            self.code,
            errno::errno_name(self.code)
        )
    }
}

impl std::error::Error for Fault {}

/// Reports an unrecoverable condition and terminates the caller's control flow.
pub trait FatalReporter: Send + Sync {
    fn fatal(&self, fault: Fault) -> !;
}

impl<R: FatalReporter + ?Sized> FatalReporter for &R {
    fn fatal(&self, fault: Fault) -> ! {
        (**self).fatal(fault)
    }
}

/// Default reporter: log, print to stderr, then follow [`config::fatal_policy`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessAbort;

impl FatalReporter for ProcessAbort {
    fn fatal(&self, fault: Fault) -> ! {
        log::error!(target: "frankensync", "fatal: {fault}");
        eprintln!("frankensync: fatal: {fault}");
        match config::fatal_policy() {
            FatalPolicy::Abort => std::process::abort(),
            FatalPolicy::Panic => std::panic::panic_any(fault),
        }
    }
}

/// Reporter that always unwinds with the [`Fault`] as panic payload.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Unwind;

impl FatalReporter for Unwind {
    fn fatal(&self, fault: Fault) -> ! {
        log::error!(target: "frankensync", "fatal (unwinding): {fault}");
        std::panic::panic_any(fault)
    }
}

/// Run `f` and return the [`Fault`] it raised through an unwinding reporter,
/// or `None` if it completed. Panics that do not carry a `Fault` are resumed.
pub fn catch_fault<F: FnOnce()>(f: F) -> Option<Fault> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(()) => None,
        Err(payload) => match payload.downcast::<Fault>() {
            Ok(fault) => Some(*fault),
            Err(other) => std::panic::resume_unwind(other),
        },
    }
}
