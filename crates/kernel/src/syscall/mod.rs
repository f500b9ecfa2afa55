//! TEAM_022: Syscall boundary.
//!
//! Entry points take decoded register arguments and return `i64`:
//! non-negative on success, a negated errno on failure. Everything
//! user-pointer-shaped is validated and copied here; the layers below
//! only ever see kernel memory.

pub mod fs;
pub mod process;

/// Negated errno values, derived from the authoritative constants.
pub mod errno {
    use linux_raw_sys::errno as raw;

    pub const EPERM: i64 = -(raw::EPERM as i64);
    pub const ENOENT: i64 = -(raw::ENOENT as i64);
    pub const ESRCH: i64 = -(raw::ESRCH as i64);
    pub const EIO: i64 = -(raw::EIO as i64);
    pub const E2BIG: i64 = -(raw::E2BIG as i64);
    pub const ENOEXEC: i64 = -(raw::ENOEXEC as i64);
    pub const EBADF: i64 = -(raw::EBADF as i64);
    pub const ECHILD: i64 = -(raw::ECHILD as i64);
    pub const ENOMEM: i64 = -(raw::ENOMEM as i64);
    pub const EFAULT: i64 = -(raw::EFAULT as i64);
    pub const EINVAL: i64 = -(raw::EINVAL as i64);
    pub const ENFILE: i64 = -(raw::ENFILE as i64);
    pub const EMFILE: i64 = -(raw::EMFILE as i64);
    pub const ESPIPE: i64 = -(raw::ESPIPE as i64);
    pub const ENAMETOOLONG: i64 = -(raw::ENAMETOOLONG as i64);
}

/// Marshalling limits.
pub mod limits {
    /// Longest accepted path, NUL included.
    pub const PATH_MAX: usize = linux_raw_sys::general::PATH_MAX as usize;
    /// Total bytes of argument strings accepted by `execv`,
    /// terminators included.
    pub const ARG_MAX: usize = 64 * 1024;
    /// Largest single read/write transfer; user callers loop on short
    /// counts, so clamping keeps kernel bounce buffers bounded.
    pub const MAX_RW_CHUNK: usize = 64 * 1024;
}
