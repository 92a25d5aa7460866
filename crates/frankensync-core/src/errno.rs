//! Error numbers used by the lock contracts.
//!
//! On Unix targets the values come from the host `libc` so that codes
//! returned by pthread and `sem_*` calls compare equal. Other targets use the
//! Linux numbering, which the Win32 backend maps its failures onto.

#[cfg(unix)]
mod values {
    pub const EPERM: i32 = libc::EPERM;
    pub const EINTR: i32 = libc::EINTR;
    pub const EAGAIN: i32 = libc::EAGAIN;
    pub const ENOMEM: i32 = libc::ENOMEM;
    pub const EBUSY: i32 = libc::EBUSY;
    pub const EINVAL: i32 = libc::EINVAL;
    pub const EDEADLK: i32 = libc::EDEADLK;
    pub const EOVERFLOW: i32 = libc::EOVERFLOW;
    pub const ENOSYS: i32 = libc::ENOSYS;
    pub const EINPROGRESS: i32 = libc::EINPROGRESS;
}

#[cfg(not(unix))]
mod values {
    pub const EPERM: i32 = 1;
    pub const EINTR: i32 = 4;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EBUSY: i32 = 16;
    pub const EINVAL: i32 = 22;
    pub const EDEADLK: i32 = 35;
    pub const EOVERFLOW: i32 = 75;
    pub const ENOSYS: i32 = 38;
    pub const EINPROGRESS: i32 = 115;
}

pub use values::*;

/// Returns the calling thread's last OS error number, or `EINVAL` when the
/// platform reported failure without setting one.
#[must_use]
pub fn last_errno() -> i32 {
    match std::io::Error::last_os_error().raw_os_error() {
        Some(0) | None => EINVAL,
        Some(code) => code,
    }
}

/// Short symbolic name for the codes this crate produces, for log lines.
#[must_use]
pub const fn errno_name(code: i32) -> &'static str {
    match code {
        0 => "OK",
        EPERM => "EPERM",
        EINTR => "EINTR",
        EAGAIN => "EAGAIN",
        ENOMEM => "ENOMEM",
        EBUSY => "EBUSY",
        EINVAL => "EINVAL",
        EDEADLK => "EDEADLK",
        EOVERFLOW => "EOVERFLOW",
        ENOSYS => "ENOSYS",
        EINPROGRESS => "EINPROGRESS",
        _ => "UNKNOWN",
    }
}
