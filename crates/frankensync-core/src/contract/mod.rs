//! Backend-independent lock contracts.
//!
//! Everything in here is plain safe Rust: transition tables the façade types
//! drive their lifecycle word through, the counter arithmetic shared by every
//! emulated semaphore, and the translation of native status conventions.

pub mod mutex;
pub mod semaphore;
pub mod status;

pub use mutex::{
    DestroyDisposition, MutexOp, MutexOutcome, MutexState, MutexVerdict, classify_destroy_status,
    mutex_transition,
};
pub use semaphore::{SEMAPHORE_VALUE_MAX, SemaphoreCounter, validate_initial_count};
pub use status::{NativeStatus, abi_bool, native_status, sem_status};
