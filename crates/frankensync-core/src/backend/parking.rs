//! Portable backend on `parking_lot`.
//!
//! Always compiled. It is the active backend when the `backend-parking`
//! feature is enabled and the reference implementation the native backends are
//! tested against. Neither type owns OS resources, so `init` cannot fail with
//! anything but an out-of-range count and `destroy` only checks for holders.

use parking_lot::lock_api::RawMutex as _;
use parking_lot::{Condvar, Mutex as PlMutex, RawMutex};

use crate::backend::{BackendKind, MutexBackend, SemaphoreBackend};
use crate::contract::{NativeStatus, SemaphoreCounter, validate_initial_count};
use crate::errno;

/// `parking_lot::RawMutex` behind the raw-mutex contract.
pub struct ParkingMutex {
    raw: RawMutex,
}

// SAFETY: `RawMutex` is a correct mutual-exclusion primitive with
// acquire/release ordering.
unsafe impl MutexBackend for ParkingMutex {
    const KIND: BackendKind = BackendKind::Parking;

    fn uninit() -> Self {
        Self { raw: RawMutex::INIT }
    }

    unsafe fn init(&self) -> NativeStatus {
        Ok(())
    }

    unsafe fn destroy(&self) -> NativeStatus {
        if self.raw.is_locked() {
            Err(errno::EBUSY)
        } else {
            Ok(())
        }
    }

    unsafe fn lock(&self) -> NativeStatus {
        self.raw.lock();
        Ok(())
    }

    unsafe fn try_lock(&self) -> Result<bool, i32> {
        Ok(self.raw.try_lock())
    }

    unsafe fn unlock(&self) -> NativeStatus {
        // SAFETY: held by the caller (trait contract).
        unsafe { self.raw.unlock() };
        Ok(())
    }
}

/// Counter under a `parking_lot` mutex, paired with a condition variable.
pub struct ParkingSemaphore {
    counter: PlMutex<SemaphoreCounter>,
    available: Condvar,
}

// SAFETY: the counter is only read or written under its mutex; down waits in a
// loop until `try_take` succeeds; up notifies one waiter only when `give`
// reports a parked thread.
unsafe impl SemaphoreBackend for ParkingSemaphore {
    const KIND: BackendKind = BackendKind::Parking;

    fn uninit() -> Self {
        Self {
            counter: PlMutex::new(SemaphoreCounter::new(0)),
            available: Condvar::new(),
        }
    }

    unsafe fn init(&self, initial: u32) -> NativeStatus {
        validate_initial_count(initial)?;
        *self.counter.lock() = SemaphoreCounter::new(initial);
        Ok(())
    }

    unsafe fn destroy(&self) -> NativeStatus {
        if self.counter.lock().waiters() > 0 {
            Err(errno::EBUSY)
        } else {
            Ok(())
        }
    }

    unsafe fn down(&self) -> NativeStatus {
        let mut counter = self.counter.lock();
        while !counter.try_take() {
            counter.park();
            self.available.wait(&mut counter);
            counter.unpark();
        }
        Ok(())
    }

    unsafe fn try_down(&self) -> Result<bool, i32> {
        Ok(self.counter.lock().try_take())
    }

    unsafe fn up(&self) -> NativeStatus {
        let mut counter = self.counter.lock();
        if counter.give()? {
            self.available.notify_one();
        }
        Ok(())
    }

    unsafe fn value(&self) -> Result<u32, i32> {
        Ok(self.counter.lock().value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_mutex_refuses_destroy() {
        let m = ParkingMutex::uninit();
        // SAFETY: single-threaded, init before use.
        unsafe {
            m.init().unwrap();
            m.lock().unwrap();
            assert_eq!(m.destroy(), Err(errno::EBUSY));
            assert_eq!(m.try_lock(), Ok(false));
            m.unlock().unwrap();
            assert_eq!(m.destroy(), Ok(()));
        }
    }

    #[test]
    fn semaphore_counts_down_to_zero() {
        let s = ParkingSemaphore::uninit();
        // SAFETY: single-threaded, init before use.
        unsafe {
            s.init(2).unwrap();
            assert_eq!(s.try_down(), Ok(true));
            s.down().unwrap();
            assert_eq!(s.try_down(), Ok(false));
            s.up().unwrap();
            assert_eq!(s.value(), Ok(1));
            s.destroy().unwrap();
        }
    }

    #[test]
    fn semaphore_rejects_oversized_count() {
        let s = ParkingSemaphore::uninit();
        // SAFETY: init on fresh storage.
        assert_eq!(unsafe { s.init(u32::MAX) }, Err(errno::EINVAL));
    }
}
