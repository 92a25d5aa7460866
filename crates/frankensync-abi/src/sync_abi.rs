//! Mutex and semaphore entry points.
//!
//! Boolean results are nonzero on success. A null handle is a no-op for the
//! destroy calls and fatal everywhere else.

use std::ffi::{c_char, c_int, c_uint};
use std::mem::{ManuallyDrop, align_of, size_of};
use std::pin::Pin;
use std::ptr;

use frankensync_core::contract::abi_bool;
use frankensync_core::{
    ACTIVE_BACKEND, ActiveSemaphore, BackendKind, FatalReporter, Fault, FaultSite, Mutex,
    ProcessAbort, Semaphore, errno,
};

use crate::macros::abi_fn;

/// Caller-allocated mutex storage. Opaque to C; size and alignment come from
/// [`frankensync_mutex_size`] and [`frankensync_mutex_align`].
pub type FrankensyncMutex = Mutex;

/// Opaque semaphore handle.
#[repr(C)]
pub struct FrankensyncSemaphore {
    _opaque: [u8; 0],
}

fn null_handle() -> ! {
    ProcessAbort.fatal(Fault::new(FaultSite::AbiNullHandle, errno::EINVAL))
}

/// # Safety
///
/// `mutex` must be null or point to storage initialised by
/// `frankensync_mutex_init` that outlives `'a`.
unsafe fn pinned_mutex<'a>(mutex: *mut FrankensyncMutex) -> Pin<&'a FrankensyncMutex> {
    if mutex.is_null() {
        null_handle();
    }
    // SAFETY: C storage is never moved by this crate (caller contract).
    unsafe { Pin::new_unchecked(&*mutex) }
}

/// Non-owning view of a semaphore handle.
///
/// # Safety
///
/// `handle` must be null or come from `frankensync_semaphore_create` and not
/// yet be destroyed.
unsafe fn semaphore_view(handle: *mut FrankensyncSemaphore) -> ManuallyDrop<Semaphore> {
    if handle.is_null() {
        null_handle();
    }
    // SAFETY: from `into_raw` in create; the view is never dropped.
    ManuallyDrop::new(unsafe { Semaphore::from_raw(handle.cast::<ActiveSemaphore>(), ProcessAbort) })
}

// ---------------------------------------------------------------------------
// Layout and backend queries
// ---------------------------------------------------------------------------

/// Bytes of storage a mutex needs.
#[unsafe(no_mangle)]
pub extern "C" fn frankensync_mutex_size() -> usize {
    size_of::<FrankensyncMutex>()
}

/// Required alignment of mutex storage.
#[unsafe(no_mangle)]
pub extern "C" fn frankensync_mutex_align() -> usize {
    align_of::<FrankensyncMutex>()
}

/// NUL-terminated name of the backend this library was built with.
#[unsafe(no_mangle)]
pub extern "C" fn frankensync_backend_name() -> *const c_char {
    let name = match ACTIVE_BACKEND {
        BackendKind::Pthread => c"pthread",
        BackendKind::Win32 => c"win32",
        BackendKind::Parking => c"parking_lot",
    };
    name.as_ptr()
}

// ---------------------------------------------------------------------------
// Mutex
// ---------------------------------------------------------------------------

abi_fn! {
    /// Initialise uninitialised or destroyed storage. Nonzero on success.
    fn frankensync_mutex_init(mutex: *mut FrankensyncMutex) -> c_int {
        if mutex.is_null() {
            null_handle();
        }
        mutex.write(Mutex::new());
        abi_bool(Pin::new_unchecked(&mut *mutex).init().is_ok())
    }
}

abi_fn! {
    /// Release the backend object. Busy and in-progress races are absorbed.
    fn frankensync_mutex_destroy(mutex: *mut FrankensyncMutex) {
        if mutex.is_null() {
            log::debug!(target: "frankensync", "destroy of null mutex ignored");
            return;
        }
        Pin::new_unchecked(&mut *mutex).destroy();
        ptr::drop_in_place(mutex);
    }
}

abi_fn! {
    fn frankensync_mutex_lock(mutex: *mut FrankensyncMutex) {
        pinned_mutex(mutex).lock();
    }
}

abi_fn! {
    /// Nonzero when the lock was taken.
    fn frankensync_mutex_trylock(mutex: *mut FrankensyncMutex) -> c_int {
        abi_bool(pinned_mutex(mutex).try_lock())
    }
}

abi_fn! {
    fn frankensync_mutex_unlock(mutex: *mut FrankensyncMutex) {
        pinned_mutex(mutex).unlock();
    }
}

// ---------------------------------------------------------------------------
// Semaphore
// ---------------------------------------------------------------------------

abi_fn! {
    /// New semaphore with count `initial`, or null on failure.
    fn frankensync_semaphore_create(initial: c_uint) -> *mut FrankensyncSemaphore {
        match Semaphore::create(initial) {
            Ok(sem) => sem.into_raw().cast(),
            Err(_) => ptr::null_mut(),
        }
    }
}

abi_fn! {
    fn frankensync_semaphore_down(sem: *mut FrankensyncSemaphore) {
        semaphore_view(sem).down();
    }
}

abi_fn! {
    /// Nonzero when the count was decremented.
    fn frankensync_semaphore_trydown(sem: *mut FrankensyncSemaphore) -> c_int {
        abi_bool(semaphore_view(sem).try_down())
    }
}

abi_fn! {
    fn frankensync_semaphore_up(sem: *mut FrankensyncSemaphore) {
        semaphore_view(sem).up();
    }
}

abi_fn! {
    fn frankensync_semaphore_destroy(sem: *mut FrankensyncSemaphore) {
        if sem.is_null() {
            log::debug!(target: "frankensync", "destroy of null semaphore ignored");
            return;
        }
        Semaphore::from_raw(sem.cast::<ActiveSemaphore>(), ProcessAbort).destroy();
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use super::*;

    #[test]
    fn backend_name_matches_build() {
        // SAFETY: static NUL-terminated string.
        let name = unsafe { CStr::from_ptr(frankensync_backend_name()) };
        assert_eq!(name.to_str().unwrap(), ACTIVE_BACKEND.name());
    }

    #[test]
    fn layout_is_nonzero() {
        assert!(frankensync_mutex_size() > 0);
        assert!(frankensync_mutex_align().is_power_of_two());
    }

    #[test]
    fn oversized_semaphore_is_null() {
        // SAFETY: no pointer arguments.
        let sem = unsafe { frankensync_semaphore_create(c_uint::MAX) };
        assert!(sem.is_null());
    }
}
