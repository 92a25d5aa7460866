//! Counting-semaphore arithmetic shared by the emulated backends.
//!
//! A backend without a native counting semaphore keeps a [`SemaphoreCounter`]
//! under its own mutex and pairs it with a condition variable. The counter
//! decides whether a down may proceed and whether an up has to signal.

use crate::errno;

/// Largest counter value any backend accepts.
///
/// Win32 semaphores take an `i32` maximum and glibc's `SEM_VALUE_MAX` is
/// `INT_MAX`, so every backend is held to the same bound.
pub const SEMAPHORE_VALUE_MAX: u32 = i32::MAX as u32;

/// Returns `Err(EINVAL)` when `initial` cannot be represented by every backend.
pub const fn validate_initial_count(initial: u32) -> Result<(), i32> {
    if initial > SEMAPHORE_VALUE_MAX {
        Err(errno::EINVAL)
    } else {
        Ok(())
    }
}

/// Counter plus the number of threads currently parked in down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SemaphoreCounter {
    value: u32,
    waiters: u32,
}

impl SemaphoreCounter {
    #[must_use]
    pub const fn new(initial: u32) -> Self {
        Self {
            value: initial,
            waiters: 0,
        }
    }

    #[must_use]
    pub const fn value(&self) -> u32 {
        self.value
    }

    #[must_use]
    pub const fn waiters(&self) -> u32 {
        self.waiters
    }

    /// Decrement if positive. Returns whether the caller may proceed.
    pub fn try_take(&mut self) -> bool {
        if self.value == 0 {
            return false;
        }
        self.value -= 1;
        true
    }

    /// Increment. Returns whether a parked waiter should be signalled.
    ///
    /// Fails with `EOVERFLOW` when the counter is already at
    /// [`SEMAPHORE_VALUE_MAX`]; the counter is left unchanged.
    pub fn give(&mut self) -> Result<bool, i32> {
        if self.value >= SEMAPHORE_VALUE_MAX {
            return Err(errno::EOVERFLOW);
        }
        self.value += 1;
        Ok(self.waiters > 0)
    }

    /// Record that the caller is about to park.
    pub fn park(&mut self) {
        self.waiters += 1;
    }

    /// Record that the caller woke up (for any reason).
    pub fn unpark(&mut self) {
        debug_assert!(self.waiters > 0, "unpark without matching park");
        self.waiters = self.waiters.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_count_bounds() {
        assert_eq!(validate_initial_count(0), Ok(()));
        assert_eq!(validate_initial_count(SEMAPHORE_VALUE_MAX), Ok(()));
        assert_eq!(
            validate_initial_count(SEMAPHORE_VALUE_MAX + 1),
            Err(errno::EINVAL)
        );
        assert_eq!(validate_initial_count(u32::MAX), Err(errno::EINVAL));
    }

    #[test]
    fn create_five_take_five_then_empty() {
        let mut counter = SemaphoreCounter::new(5);
        for _ in 0..5 {
            assert!(counter.try_take());
        }
        assert!(!counter.try_take());
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn give_signals_only_with_waiters() {
        let mut counter = SemaphoreCounter::new(0);
        assert_eq!(counter.give(), Ok(false));

        counter.park();
        assert_eq!(counter.give(), Ok(true));
        counter.unpark();
        assert_eq!(counter.waiters(), 0);
        assert_eq!(counter.value(), 2);
    }

    #[test]
    fn give_at_max_overflows_without_change() {
        let mut counter = SemaphoreCounter::new(SEMAPHORE_VALUE_MAX);
        assert_eq!(counter.give(), Err(errno::EOVERFLOW));
        assert_eq!(counter.value(), SEMAPHORE_VALUE_MAX);
    }

    #[test]
    fn counter_tracks_ups_minus_downs() {
        let initial = 3;
        let mut counter = SemaphoreCounter::new(initial);
        let mut ups = 0u32;
        let mut downs = 0u32;
        // Deterministic interleaving: two ups, three downs, repeated.
        for round in 0..20 {
            if round % 5 < 2 {
                counter.give().unwrap();
                ups += 1;
            } else if counter.try_take() {
                downs += 1;
            }
            assert_eq!(counter.value(), initial + ups - downs);
        }
    }
}
