//! # frankensync-core
//!
//! A portable mutex and counting semaphore over whichever threading backend
//! the build selects: POSIX threads, Win32, or `parking_lot`.
//!
//! Callers see two façades. [`Mutex`] is an inline, pinned lock whose lock and
//! unlock never fail from the caller's point of view; [`Semaphore`] is a
//! heap-allocated counter with blocking `down` and waking `up`. Setup failures
//! (init, create) are returned as [`SyncError`]. Anything later that the
//! contract cannot absorb is handed to a [`FatalReporter`].
//!
//! `unsafe` is confined to the backend modules and the two façades.

#![deny(unsafe_code)]

#[allow(unsafe_code)]
pub mod backend;
pub mod config;
pub mod contract;
pub mod errno;
pub mod error;
pub mod fatal;
#[allow(unsafe_code)]
pub mod mutex;
#[allow(unsafe_code)]
pub mod semaphore;

pub use backend::{
    ACTIVE_BACKEND, ActiveMutex, ActiveSemaphore, BackendKind, MutexBackend, SemaphoreBackend,
};
pub use config::{FatalPolicy, fatal_policy, set_fatal_policy};
pub use contract::SEMAPHORE_VALUE_MAX;
pub use error::SyncError;
pub use fatal::{FatalReporter, Fault, FaultSite, ProcessAbort, Unwind, catch_fault};
pub use mutex::{Mutex, MutexGuard};
pub use semaphore::Semaphore;
