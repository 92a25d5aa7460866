// Every export takes raw handles from C; the contract is in the module docs.
#![allow(clippy::missing_safety_doc)]
//! # frankensync-abi
//!
//! `extern "C"` boundary for frankensync, built as `libfrankensync.so` (or the
//! platform equivalent) plus an `rlib` for Rust tests.
//!
//! ```text
//! C caller -> ABI entry (this crate) -> frankensync-core façade -> backend
//! ```
//!
//! Mutex storage is allocated by the caller; semaphores are opaque heap
//! handles. Results follow the C convention: nonzero for success, null for a
//! failed create.

mod macros;

pub mod sync_abi;

pub use sync_abi::{FrankensyncMutex, FrankensyncSemaphore};
