//! Threading backends.
//!
//! Each backend provides one raw mutex type implementing [`MutexBackend`] and
//! one raw semaphore type implementing [`SemaphoreBackend`]. Exactly one pair
//! is *active* per build ([`ActiveMutex`], [`ActiveSemaphore`]); it is the
//! default type parameter of the [`Mutex`](crate::Mutex) and
//! [`Semaphore`](crate::Semaphore) façades. The other backends that compile on
//! the target stay reachable by naming them explicitly.
//!
//! | backend | mutex | semaphore |
//! |---|---|---|
//! | `pthread` | `pthread_mutex_t` | `sem_t`, or mutex + `pthread_cond_t` on Apple targets |
//! | `win32` | `CRITICAL_SECTION` | `CreateSemaphoreW` |
//! | `parking` | `parking_lot::RawMutex` | `parking_lot` mutex + condvar |

use std::fmt;

use crate::contract::NativeStatus;

pub mod parking;
#[cfg(unix)]
pub mod pthread;
#[cfg(windows)]
pub mod win32;

/// Identifies a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Pthread,
    Win32,
    Parking,
}

impl BackendKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pthread => "pthread",
            Self::Win32 => "win32",
            Self::Parking => "parking_lot",
        }
    }

    /// Whether this backend's semaphore passes through to an OS counting
    /// semaphore rather than emulating one.
    #[must_use]
    pub const fn has_native_semaphore(self) -> bool {
        match self {
            Self::Pthread => cfg!(not(any(
                target_os = "macos",
                target_os = "ios",
                target_os = "tvos",
                target_os = "watchos"
            ))),
            Self::Win32 => true,
            Self::Parking => false,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A raw exclusive lock.
///
/// Implementations translate the native success convention into
/// [`NativeStatus`]; they never report faults themselves.
///
/// # Safety
///
/// Implementors must provide mutual exclusion between a successful `lock` (or
/// `try_lock` returning `Ok(true)`) and the matching `unlock`, with release
/// semantics on `unlock` and acquire semantics on acquisition.
///
/// Callers must call `init` exactly once before any other method, on a value
/// that will not move again until `destroy` returns; call `unlock` only while
/// holding the lock; and call `destroy` only when no other thread can touch
/// the value.
pub unsafe trait MutexBackend: Send + Sync {
    const KIND: BackendKind;

    /// Storage in the uninitialised state. Free to move.
    fn uninit() -> Self;

    unsafe fn init(&self) -> NativeStatus;
    unsafe fn destroy(&self) -> NativeStatus;
    unsafe fn lock(&self) -> NativeStatus;
    /// `Ok(false)` when another holder has it.
    unsafe fn try_lock(&self) -> Result<bool, i32>;
    unsafe fn unlock(&self) -> NativeStatus;
}

/// A raw counting semaphore.
///
/// # Safety
///
/// Implementors must keep the counter non-negative, make `down` return only
/// after decrementing it, release at most one parked `down` per `up`, and give
/// `up` release semantics paired with acquire semantics in the `down` it
/// releases.
///
/// Callers must call `init` once on a value at its final (heap) address and
/// call `destroy` only when no thread is or will be waiting.
pub unsafe trait SemaphoreBackend: Send + Sync {
    const KIND: BackendKind;

    fn uninit() -> Self;

    unsafe fn init(&self, initial: u32) -> NativeStatus;
    unsafe fn destroy(&self) -> NativeStatus;
    unsafe fn down(&self) -> NativeStatus;
    /// `Ok(false)` when the counter is zero.
    unsafe fn try_down(&self) -> Result<bool, i32>;
    unsafe fn up(&self) -> NativeStatus;
    /// Racy snapshot of the counter.
    unsafe fn value(&self) -> Result<u32, i32>;
}

// ---------------------------------------------------------------------------
// Build-time selection
// ---------------------------------------------------------------------------

#[cfg(feature = "backend-parking")]
mod select {
    pub type ActiveMutex = super::parking::ParkingMutex;
    pub type ActiveSemaphore = super::parking::ParkingSemaphore;
    pub const ACTIVE_BACKEND: super::BackendKind = super::BackendKind::Parking;
}

#[cfg(all(not(feature = "backend-parking"), unix))]
mod select {
    pub type ActiveMutex = super::pthread::PthreadMutex;
    pub type ActiveSemaphore = super::pthread::PthreadSemaphore;
    pub const ACTIVE_BACKEND: super::BackendKind = super::BackendKind::Pthread;
}

#[cfg(all(not(feature = "backend-parking"), windows))]
mod select {
    pub type ActiveMutex = super::win32::CriticalSection;
    pub type ActiveSemaphore = super::win32::Win32Semaphore;
    pub const ACTIVE_BACKEND: super::BackendKind = super::BackendKind::Win32;
}

#[cfg(all(not(feature = "backend-parking"), not(unix), not(windows)))]
compile_error!(
    "frankensync: no threading backend for this target; enable the `backend-parking` feature"
);

pub use select::{ACTIVE_BACKEND, ActiveMutex, ActiveSemaphore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        assert_eq!(BackendKind::Pthread.to_string(), "pthread");
        assert_eq!(BackendKind::Win32.to_string(), "win32");
        assert_eq!(BackendKind::Parking.to_string(), "parking_lot");
    }

    #[test]
    fn parking_always_emulates() {
        assert!(!BackendKind::Parking.has_native_semaphore());
        assert!(BackendKind::Win32.has_native_semaphore());
    }

    #[test]
    fn active_backend_matches_raw_types() {
        assert_eq!(ActiveMutex::KIND, ACTIVE_BACKEND);
        assert_eq!(ActiveSemaphore::KIND, ACTIVE_BACKEND);
    }
}
