//! Process-wide configuration.
//!
//! The fatal policy is set via the `FRANKENSYNC_FATAL` environment variable:
//! - `abort` (default): a fatal primitive failure logs and aborts the process.
//! - `panic`: a fatal primitive failure panics with the [`Fault`] as payload so
//!   an embedding test runner can observe it. Only meaningful with
//!   `panic = "unwind"`.
//!
//! The backend is selected at build time, see [`crate::backend`].
//!
//! [`Fault`]: crate::fatal::Fault

use std::sync::atomic::{AtomicU8, Ordering};

/// Environment variable consulted on first use of [`fatal_policy`].
pub const FATAL_POLICY_ENV: &str = "FRANKENSYNC_FATAL";

/// What the default reporter does after logging a fault.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FatalPolicy {
    /// Terminate the process with `std::process::abort`.
    #[default]
    Abort,
    /// Unwind with `std::panic::panic_any(fault)`.
    Panic,
}

impl FatalPolicy {
    /// Parse from string (case-insensitive). Unknown values fall back to abort.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "panic" | "unwind" | "test" => Self::Panic,
            _ => Self::Abort,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Panic => "panic",
        }
    }
}

// 0=unresolved, 1=Abort, 2=Panic, 255=resolving.
static CACHED_POLICY: AtomicU8 = AtomicU8::new(0);

const POLICY_UNRESOLVED: u8 = 0;
const POLICY_ABORT: u8 = 1;
const POLICY_PANIC: u8 = 2;
const POLICY_RESOLVING: u8 = 255;

fn policy_to_u8(policy: FatalPolicy) -> u8 {
    match policy {
        FatalPolicy::Abort => POLICY_ABORT,
        FatalPolicy::Panic => POLICY_PANIC,
    }
}

fn u8_to_policy(v: u8) -> FatalPolicy {
    match v {
        POLICY_PANIC => FatalPolicy::Panic,
        _ => FatalPolicy::Abort,
    }
}

/// Get the configured fatal policy (reads the env var on first call, caches
/// thereafter).
///
/// A fault raised on another thread while the variable is being read sees the
/// `RESOLVING` state and gets the abort default rather than waiting.
#[must_use]
pub fn fatal_policy() -> FatalPolicy {
    let cached = CACHED_POLICY.load(Ordering::Acquire);
    if cached != POLICY_UNRESOLVED && cached != POLICY_RESOLVING {
        return u8_to_policy(cached);
    }
    if cached == POLICY_RESOLVING {
        return FatalPolicy::Abort;
    }

    if CACHED_POLICY
        .compare_exchange(
            POLICY_UNRESOLVED,
            POLICY_RESOLVING,
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .is_err()
    {
        let v = CACHED_POLICY.load(Ordering::Acquire);
        return if v != POLICY_UNRESOLVED && v != POLICY_RESOLVING {
            u8_to_policy(v)
        } else {
            FatalPolicy::Abort
        };
    }

    let policy = std::env::var(FATAL_POLICY_ENV)
        .map(|v| FatalPolicy::from_str_loose(&v))
        .unwrap_or_default();
    CACHED_POLICY.store(policy_to_u8(policy), Ordering::Release);
    policy
}

/// Override the fatal policy for the rest of the process, ignoring the
/// environment. Returns the policy that was in effect before.
pub fn set_fatal_policy(policy: FatalPolicy) -> FatalPolicy {
    let previous = fatal_policy();
    CACHED_POLICY.store(policy_to_u8(policy), Ordering::Release);
    previous
}
