//! Recoverable setup failures.

use thiserror::Error;

use crate::backend::BackendKind;

/// Error returned by mutex initialization and semaphore creation.
///
/// These are the only operations whose failure the caller may act on, for
/// example by retrying with a smaller resource budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("{backend} backend failed to initialise mutex (errno {code})")]
    MutexInit { backend: BackendKind, code: i32 },
    #[error("mutex is already initialised")]
    AlreadyInitialized,
    #[error("{backend} backend failed to initialise semaphore (errno {code})")]
    SemaphoreInit { backend: BackendKind, code: i32 },
    #[error("semaphore initial count {requested} exceeds maximum {max}")]
    CountOutOfRange { requested: u32, max: u32 },
    #[error("out of memory allocating {bytes} bytes for semaphore")]
    AllocationFailed { bytes: usize },
}

impl SyncError {
    /// Errno-style code for the C boundary.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::MutexInit { code, .. } | Self::SemaphoreInit { code, .. } => *code,
            Self::AlreadyInitialized => crate::errno::EBUSY,
            Self::CountOutOfRange { .. } => crate::errno::EINVAL,
            Self::AllocationFailed { .. } => crate::errno::ENOMEM,
        }
    }
}
