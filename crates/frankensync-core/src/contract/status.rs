//! Native status conventions.
//!
//! pthread calls return `0` or an error number. `sem_*` calls return `0` or
//! `-1` with the error in `errno`. The C boundary of this crate returns
//! nonzero on success. All of that is folded into [`NativeStatus`] here so
//! the façade only ever sees `Ok(())` or `Err(code)`.

use std::ffi::c_int;

/// Result of a native primitive call: `Err` carries an errno-style code.
pub type NativeStatus = Result<(), i32>;

/// Translate a pthread-style return value (zero on success).
#[must_use]
pub const fn native_status(rc: c_int) -> NativeStatus {
    if rc == 0 { Ok(()) } else { Err(rc) }
}

/// Translate a `sem_*`-style return value (`-1` on failure, code in errno).
#[must_use]
pub const fn sem_status(rc: c_int, errno: i32) -> NativeStatus {
    if rc == 0 { Ok(()) } else { Err(errno) }
}

/// Boolean as the C boundary reports it: nonzero on success.
#[must_use]
pub const fn abi_bool(ok: bool) -> c_int {
    if ok { 1 } else { 0 }
}
