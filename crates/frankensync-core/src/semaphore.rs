//! Heap-allocated counting semaphore façade.

use std::alloc::{self, Layout};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::backend::{ActiveSemaphore, BackendKind, SemaphoreBackend};
use crate::contract::SEMAPHORE_VALUE_MAX;
use crate::error::SyncError;
use crate::fatal::{FatalReporter, Fault, FaultSite, ProcessAbort};

/// Counting semaphore over backend `B`, reporting faults to `R`.
///
/// The backend object lives on the heap so the handle itself can move freely.
/// `down` blocks while the count is zero; `up` releases at most one blocked
/// `down`. Which waiter is released is unspecified.
pub struct Semaphore<B: SemaphoreBackend = ActiveSemaphore, R: FatalReporter = ProcessAbort> {
    // Not a `Box`: the C boundary rebuilds short-lived handles to the same
    // allocation from several threads at once.
    raw: NonNull<B>,
    reporter: R,
    _owns: PhantomData<B>,
}

// SAFETY: the handle owns a `B`, and `B: Send + Sync` by the backend trait.
unsafe impl<B: SemaphoreBackend, R: FatalReporter> Send for Semaphore<B, R> {}
// SAFETY: every method takes `&self` on `B`, which is `Sync`.
unsafe impl<B: SemaphoreBackend, R: FatalReporter> Sync for Semaphore<B, R> {}

impl Semaphore {
    /// Allocate a semaphore with count `initial` on the build's backend.
    ///
    /// Every failure (count above [`SEMAPHORE_VALUE_MAX`], allocation, backend
    /// setup) is returned; this never panics or aborts.
    pub fn create(initial: u32) -> Result<Self, SyncError> {
        Self::create_with(initial, ProcessAbort)
    }
}

/// `Box::new` that reports allocation failure instead of aborting.
fn try_box<T>(value: T) -> Result<Box<T>, SyncError> {
    let layout = Layout::new::<T>();
    if layout.size() == 0 {
        return Ok(Box::new(value));
    }
    // SAFETY: non-zero size checked above.
    let ptr = unsafe { alloc::alloc(layout) }.cast::<T>();
    if ptr.is_null() {
        return Err(SyncError::AllocationFailed {
            bytes: layout.size(),
        });
    }
    // SAFETY: fresh allocation with `T`'s layout from the global allocator,
    // which is exactly what `Box::from_raw` expects.
    unsafe {
        ptr.write(value);
        Ok(Box::from_raw(ptr))
    }
}

impl<B: SemaphoreBackend, R: FatalReporter> Semaphore<B, R> {
    pub fn create_with(initial: u32, reporter: R) -> Result<Self, SyncError> {
        if initial > SEMAPHORE_VALUE_MAX {
            log::warn!(
                target: "frankensync",
                "semaphore initial count {initial} exceeds {SEMAPHORE_VALUE_MAX}"
            );
            return Err(SyncError::CountOutOfRange {
                requested: initial,
                max: SEMAPHORE_VALUE_MAX,
            });
        }
        let raw = try_box(B::uninit()).inspect_err(|err| {
            log::warn!(target: "frankensync", "semaphore create failed: {err}");
        })?;
        // SAFETY: boxed, so the address is final; not yet shared.
        if let Err(code) = unsafe { raw.init(initial) } {
            log::warn!(
                target: "frankensync",
                "{} semaphore init failed: errno {code}",
                B::KIND
            );
            return Err(SyncError::SemaphoreInit {
                backend: B::KIND,
                code,
            });
        }
        Ok(Self {
            raw: NonNull::from(Box::leak(raw)),
            reporter,
            _owns: PhantomData,
        })
    }

    fn raw(&self) -> &B {
        // SAFETY: allocated in `create_with`, freed only in drop.
        unsafe { self.raw.as_ref() }
    }

    #[must_use]
    pub fn backend(&self) -> BackendKind {
        B::KIND
    }

    /// Block until the count is positive, then decrement it.
    pub fn down(&self) {
        // SAFETY: initialised in `create_with`, destroyed only in drop.
        if let Err(code) = unsafe { self.raw().down() } {
            self.reporter.fatal(Fault::new(FaultSite::SemaphoreDown, code));
        }
    }

    /// Decrement if the count is positive; `false` otherwise.
    #[must_use]
    pub fn try_down(&self) -> bool {
        // SAFETY: as in `down`.
        match unsafe { self.raw().try_down() } {
            Ok(taken) => taken,
            Err(code) => self
                .reporter
                .fatal(Fault::new(FaultSite::SemaphoreTryDown, code)),
        }
    }

    /// Increment the count, releasing one blocked `down` if any.
    ///
    /// Incrementing past [`SEMAPHORE_VALUE_MAX`] is fatal.
    pub fn up(&self) {
        // SAFETY: as in `down`.
        if let Err(code) = unsafe { self.raw().up() } {
            self.reporter.fatal(Fault::new(FaultSite::SemaphoreUp, code));
        }
    }

    /// Snapshot of the count. Stale as soon as it returns.
    #[must_use]
    pub fn value(&self) -> u32 {
        // SAFETY: as in `down`.
        match unsafe { self.raw().value() } {
            Ok(v) => v,
            Err(code) => self
                .reporter
                .fatal(Fault::new(FaultSite::SemaphoreValue, code)),
        }
    }

    /// Release the backend object and the allocation. Same as dropping.
    pub fn destroy(self) {
        drop(self);
    }

    /// Give up ownership of the backend allocation, for handing across the C
    /// boundary. The reporter is dropped.
    #[must_use]
    pub fn into_raw(self) -> *mut B {
        let this = std::mem::ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the reporter is read out once.
        let _reporter = unsafe { std::ptr::read(&this.reporter) };
        this.raw.as_ptr()
    }

    /// Rebuild a handle from [`Semaphore::into_raw`].
    ///
    /// # Safety
    ///
    /// `raw` must come from `into_raw` on a `Semaphore<B, _>`. Only one
    /// rebuilt handle may be dropped; any others must be wrapped in
    /// [`ManuallyDrop`](std::mem::ManuallyDrop).
    pub unsafe fn from_raw(raw: *mut B, reporter: R) -> Self {
        Self {
            // SAFETY: non-null, from `into_raw` (caller contract).
            raw: unsafe { NonNull::new_unchecked(raw) },
            reporter,
            _owns: PhantomData,
        }
    }
}

impl<B: SemaphoreBackend, R: FatalReporter> Drop for Semaphore<B, R> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no thread is inside `down`.
        if let Err(code) = unsafe { self.raw().destroy() } {
            log::warn!(
                target: "frankensync",
                "{} semaphore destroy failed: errno {code}",
                B::KIND
            );
        }
        // SAFETY: leaked from a `Box` in `create_with`; this is the owning
        // handle.
        drop(unsafe { Box::from_raw(self.raw.as_ptr()) });
    }
}

impl<B: SemaphoreBackend, R: FatalReporter> fmt::Debug for Semaphore<B, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("backend", &B::KIND)
            .finish_non_exhaustive()
    }
}
