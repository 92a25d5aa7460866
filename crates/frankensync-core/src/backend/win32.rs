//! Win32 backend: `CRITICAL_SECTION` and kernel semaphore objects.
//!
//! Critical sections are recursive, which the contract's NORMAL mutex is not.
//! Every entry point backs out of a recursive entry: `try_lock` and `destroy`
//! report the lock as busy, `lock` reports `EDEADLK` (fatal at the façade)
//! where the native primitive would have let the holder in again.

use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicI64, AtomicPtr, Ordering};

use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_NOT_ENOUGH_MEMORY, ERROR_OUTOFMEMORY, ERROR_TOO_MANY_POSTS, GetLastError,
    WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::System::Threading::{
    CRITICAL_SECTION, CreateSemaphoreW, DeleteCriticalSection, EnterCriticalSection, INFINITE,
    InitializeCriticalSectionAndSpinCount, LeaveCriticalSection, ReleaseSemaphore,
    TryEnterCriticalSection, WaitForSingleObject,
};

use crate::backend::{BackendKind, MutexBackend, SemaphoreBackend};
use crate::contract::{NativeStatus, SEMAPHORE_VALUE_MAX, validate_initial_count};
use crate::errno;

/// Spin iterations before a contended `EnterCriticalSection` sleeps.
const SPIN_COUNT: u32 = 16;

/// Last Win32 error folded into the errno space where a counterpart exists.
fn last_error() -> i32 {
    // SAFETY: no preconditions.
    match unsafe { GetLastError() } {
        0 => errno::EINVAL,
        ERROR_TOO_MANY_POSTS => errno::EOVERFLOW,
        ERROR_NOT_ENOUGH_MEMORY | ERROR_OUTOFMEMORY => errno::ENOMEM,
        code => code as i32,
    }
}

// ---------------------------------------------------------------------------
// Mutex
// ---------------------------------------------------------------------------

pub struct CriticalSection {
    raw: UnsafeCell<CRITICAL_SECTION>,
}

// SAFETY: critical sections may be entered and left from any thread.
unsafe impl Send for CriticalSection {}
// SAFETY: as above.
unsafe impl Sync for CriticalSection {}

impl CriticalSection {
    /// After a successful `TryEnterCriticalSection`: whether this thread
    /// already held the section before entering.
    unsafe fn reentered(&self) -> bool {
        // SAFETY: the section is held by this thread, so its fields are stable.
        unsafe { (*self.raw.get()).RecursionCount > 1 }
    }
}

// SAFETY: `EnterCriticalSection`/`LeaveCriticalSection` provide mutual
// exclusion with full barriers; recursive entries are refused.
unsafe impl MutexBackend for CriticalSection {
    const KIND: BackendKind = BackendKind::Win32;

    fn uninit() -> Self {
        Self {
            // SAFETY: CRITICAL_SECTION is plain data until initialised.
            raw: UnsafeCell::new(unsafe { std::mem::zeroed() }),
        }
    }

    unsafe fn init(&self) -> NativeStatus {
        // SAFETY: storage at its final address (caller contract).
        if unsafe { InitializeCriticalSectionAndSpinCount(self.raw.get(), SPIN_COUNT) } == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    unsafe fn destroy(&self) -> NativeStatus {
        // SAFETY: initialised (caller contract).
        if unsafe { TryEnterCriticalSection(self.raw.get()) } == 0 {
            return Err(errno::EBUSY);
        }
        // SAFETY: entered just above.
        let held = unsafe { self.reentered() };
        // SAFETY: entered just above.
        unsafe { LeaveCriticalSection(self.raw.get()) };
        if held {
            return Err(errno::EBUSY);
        }
        // SAFETY: unowned and no other users (caller contract).
        unsafe { DeleteCriticalSection(self.raw.get()) };
        Ok(())
    }

    unsafe fn lock(&self) -> NativeStatus {
        // SAFETY: initialised (caller contract).
        unsafe { EnterCriticalSection(self.raw.get()) };
        // SAFETY: entered just above.
        if unsafe { self.reentered() } {
            // SAFETY: entered just above; the outer hold is kept.
            unsafe { LeaveCriticalSection(self.raw.get()) };
            return Err(errno::EDEADLK);
        }
        Ok(())
    }

    unsafe fn try_lock(&self) -> Result<bool, i32> {
        // SAFETY: initialised (caller contract).
        if unsafe { TryEnterCriticalSection(self.raw.get()) } == 0 {
            return Ok(false);
        }
        // SAFETY: entered just above.
        if unsafe { self.reentered() } {
            // SAFETY: entered just above.
            unsafe { LeaveCriticalSection(self.raw.get()) };
            return Ok(false);
        }
        Ok(true)
    }

    unsafe fn unlock(&self) -> NativeStatus {
        // SAFETY: held by the caller (caller contract).
        unsafe { LeaveCriticalSection(self.raw.get()) };
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Semaphore
// ---------------------------------------------------------------------------

/// Kernel semaphore created with `CreateSemaphoreW`.
///
/// Win32 offers no documented call to read a semaphore's count, so `value`
/// reports a shadow counter maintained alongside the kernel object.
pub struct Win32Semaphore {
    handle: AtomicPtr<c_void>,
    shadow: AtomicI64,
}

// SAFETY: semaphore handles are usable from any thread; the kernel object
// provides the counting and wake-one semantics.
unsafe impl SemaphoreBackend for Win32Semaphore {
    const KIND: BackendKind = BackendKind::Win32;

    fn uninit() -> Self {
        Self {
            handle: AtomicPtr::new(ptr::null_mut()),
            shadow: AtomicI64::new(0),
        }
    }

    unsafe fn init(&self, initial: u32) -> NativeStatus {
        validate_initial_count(initial)?;
        // SAFETY: null attributes and name are permitted.
        let handle = unsafe {
            CreateSemaphoreW(
                ptr::null(),
                initial as i32,
                SEMAPHORE_VALUE_MAX as i32,
                ptr::null(),
            )
        };
        if handle.is_null() {
            return Err(last_error());
        }
        self.shadow.store(i64::from(initial), Ordering::Relaxed);
        self.handle.store(handle, Ordering::Release);
        Ok(())
    }

    unsafe fn destroy(&self) -> NativeStatus {
        let handle = self.handle.swap(ptr::null_mut(), Ordering::AcqRel);
        // SAFETY: handle came from CreateSemaphoreW and is closed once.
        if unsafe { CloseHandle(handle) } == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    unsafe fn down(&self) -> NativeStatus {
        let handle = self.handle.load(Ordering::Acquire);
        // SAFETY: live handle (caller contract).
        match unsafe { WaitForSingleObject(handle, INFINITE) } {
            WAIT_OBJECT_0 => {
                self.shadow.fetch_sub(1, Ordering::Relaxed);
                Ok(())
            }
            _ => Err(last_error()),
        }
    }

    unsafe fn try_down(&self) -> Result<bool, i32> {
        let handle = self.handle.load(Ordering::Acquire);
        // SAFETY: live handle (caller contract).
        match unsafe { WaitForSingleObject(handle, 0) } {
            WAIT_OBJECT_0 => {
                self.shadow.fetch_sub(1, Ordering::Relaxed);
                Ok(true)
            }
            WAIT_TIMEOUT => Ok(false),
            _ => Err(last_error()),
        }
    }

    unsafe fn up(&self) -> NativeStatus {
        let handle = self.handle.load(Ordering::Acquire);
        self.shadow.fetch_add(1, Ordering::Relaxed);
        // SAFETY: live handle (caller contract).
        if unsafe { ReleaseSemaphore(handle, 1, ptr::null_mut()) } == 0 {
            self.shadow.fetch_sub(1, Ordering::Relaxed);
            return Err(last_error());
        }
        Ok(())
    }

    unsafe fn value(&self) -> Result<u32, i32> {
        let v = self.shadow.load(Ordering::Relaxed);
        Ok(v.clamp(0, i64::from(SEMAPHORE_VALUE_MAX)) as u32)
    }
}
