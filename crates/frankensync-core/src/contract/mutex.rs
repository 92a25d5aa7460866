//! Mutex lifecycle contract.
//!
//! The façade keeps a one-byte lifecycle word next to the native lock object
//! and consults [`mutex_transition`] before every native call. The table turns
//! what the native primitives leave undefined (locking storage that was never
//! initialised, unlocking an unlocked mutex) into a defined verdict.

use crate::errno;

// ---------------------------------------------------------------------------
// States and operations
// ---------------------------------------------------------------------------

/// Abstract lifecycle state of a mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MutexState {
    /// Storage has not been initialised as a mutex.
    Uninitialized = 0,
    /// Initialised and currently unlocked.
    Unlocked = 1,
    /// Initialised and held by some thread.
    Locked = 2,
    /// Destroyed; must be initialised again before reuse.
    Destroyed = 3,
}

impl MutexState {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a lifecycle word. Unknown values read as uninitialised.
    #[must_use]
    pub const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Unlocked,
            2 => Self::Locked,
            3 => Self::Destroyed,
            _ => Self::Uninitialized,
        }
    }

    #[must_use]
    pub const fn is_initialized(self) -> bool {
        matches!(self, Self::Unlocked | Self::Locked)
    }
}

/// Operations of the mutex contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutexOp {
    Init,
    Lock,
    TryLock,
    Unlock,
    Destroy,
}

/// What the façade must do for an operation in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutexVerdict {
    /// Call the backend; it will not wait on another holder.
    Proceed,
    /// Call the backend; it may wait for the current holder.
    Blocks,
    /// Refuse with a recoverable error, backend untouched.
    Refused(i32),
    /// Nothing to do.
    Ignore,
    /// Contract violation; report to the fatal collaborator.
    Misuse(i32),
}

/// Deterministic transition result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutexOutcome {
    /// State after the operation completes successfully.
    pub next: MutexState,
    pub verdict: MutexVerdict,
}

const fn outcome(next: MutexState, verdict: MutexVerdict) -> MutexOutcome {
    MutexOutcome { next, verdict }
}

/// Transition table for a NORMAL (non-recursive, non-error-checking) mutex.
///
/// `Locked` does not record which thread holds the lock, so `Lock` from the
/// holder and from another thread both read as [`MutexVerdict::Blocks`]; the
/// former deadlocks exactly as the native primitive does.
#[must_use]
pub const fn mutex_transition(state: MutexState, op: MutexOp) -> MutexOutcome {
    use MutexState::*;
    use MutexVerdict::*;

    match state {
        Uninitialized | Destroyed => match op {
            MutexOp::Init => outcome(Unlocked, Proceed),
            // Teardown of storage that never held a live mutex is a no-op,
            // which is what lets `Drop` run unconditionally.
            MutexOp::Destroy => outcome(state, Ignore),
            MutexOp::Lock | MutexOp::TryLock | MutexOp::Unlock => {
                outcome(state, Misuse(errno::EINVAL))
            }
        },
        Unlocked => match op {
            MutexOp::Init => outcome(Unlocked, Refused(errno::EBUSY)),
            MutexOp::Lock | MutexOp::TryLock => outcome(Locked, Proceed),
            MutexOp::Unlock => outcome(Unlocked, Misuse(errno::EPERM)),
            MutexOp::Destroy => outcome(Destroyed, Proceed),
        },
        Locked => match op {
            MutexOp::Init => outcome(Locked, Refused(errno::EBUSY)),
            MutexOp::Lock => outcome(Locked, Blocks),
            MutexOp::TryLock => outcome(Locked, Proceed),
            MutexOp::Unlock => outcome(Unlocked, Proceed),
            // The native destroy sees a held lock and reports busy; let it,
            // then classify the status.
            MutexOp::Destroy => outcome(Destroyed, Proceed),
        },
    }
}

// ---------------------------------------------------------------------------
// Destroy status classification
// ---------------------------------------------------------------------------

/// How a native destroy status is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestroyDisposition {
    /// Resources released.
    Destroyed,
    /// Benign concurrent teardown activity; absorbed silently.
    TolerableRace,
    /// Anything else; reported to the fatal collaborator.
    Fatal,
}

/// Classify the status returned by a native mutex destroy.
///
/// `EBUSY` (held), `EAGAIN` and `EINPROGRESS` (teardown already under way) are
/// races the caller cannot act on and must not die from.
#[must_use]
pub const fn classify_destroy_status(code: i32) -> DestroyDisposition {
    if code == 0 {
        DestroyDisposition::Destroyed
    } else if code == errno::EBUSY || code == errno::EAGAIN || code == errno::EINPROGRESS {
        DestroyDisposition::TolerableRace
    } else {
        DestroyDisposition::Fatal
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [MutexState; 4] = [
        MutexState::Uninitialized,
        MutexState::Unlocked,
        MutexState::Locked,
        MutexState::Destroyed,
    ];

    #[test]
    fn state_word_roundtrips() {
        for state in ALL_STATES {
            assert_eq!(MutexState::from_u8(state.as_u8()), state);
        }
        assert_eq!(MutexState::from_u8(0xAA), MutexState::Uninitialized);
    }

    #[test]
    fn init_only_from_dead_states() {
        for state in ALL_STATES {
            let out = mutex_transition(state, MutexOp::Init);
            if state.is_initialized() {
                assert_eq!(out.verdict, MutexVerdict::Refused(errno::EBUSY));
                assert_eq!(out.next, state);
            } else {
                assert_eq!(out.verdict, MutexVerdict::Proceed);
                assert_eq!(out.next, MutexState::Unlocked);
            }
        }
    }

    #[test]
    fn lock_on_uninitialized_is_misuse() {
        let out = mutex_transition(MutexState::Uninitialized, MutexOp::Lock);
        assert_eq!(out.verdict, MutexVerdict::Misuse(errno::EINVAL));
        assert_eq!(out.next, MutexState::Uninitialized);
    }

    #[test]
    fn lock_after_destroy_is_misuse() {
        for op in [MutexOp::Lock, MutexOp::TryLock, MutexOp::Unlock] {
            let out = mutex_transition(MutexState::Destroyed, op);
            assert_eq!(out.verdict, MutexVerdict::Misuse(errno::EINVAL));
        }
    }

    #[test]
    fn relock_blocks() {
        let out = mutex_transition(MutexState::Locked, MutexOp::Lock);
        assert_eq!(out.verdict, MutexVerdict::Blocks);
        assert_eq!(out.next, MutexState::Locked);
    }

    #[test]
    fn unlock_of_unlocked_is_eperm_misuse() {
        let out = mutex_transition(MutexState::Unlocked, MutexOp::Unlock);
        assert_eq!(out.verdict, MutexVerdict::Misuse(errno::EPERM));
    }

    #[test]
    fn unlock_releases() {
        let out = mutex_transition(MutexState::Locked, MutexOp::Unlock);
        assert_eq!(out.verdict, MutexVerdict::Proceed);
        assert_eq!(out.next, MutexState::Unlocked);
    }

    #[test]
    fn destroy_of_never_initialized_is_ignored() {
        for state in [MutexState::Uninitialized, MutexState::Destroyed] {
            let out = mutex_transition(state, MutexOp::Destroy);
            assert_eq!(out.verdict, MutexVerdict::Ignore);
            assert_eq!(out.next, state);
        }
    }

    #[test]
    fn destroy_status_classification() {
        assert_eq!(classify_destroy_status(0), DestroyDisposition::Destroyed);
        assert_eq!(
            classify_destroy_status(errno::EBUSY),
            DestroyDisposition::TolerableRace
        );
        assert_eq!(
            classify_destroy_status(errno::EAGAIN),
            DestroyDisposition::TolerableRace
        );
        assert_eq!(
            classify_destroy_status(errno::EINPROGRESS),
            DestroyDisposition::TolerableRace
        );
        assert_eq!(
            classify_destroy_status(errno::EINVAL),
            DestroyDisposition::Fatal
        );
        assert_eq!(
            classify_destroy_status(errno::EPERM),
            DestroyDisposition::Fatal
        );
    }
}
