//! TEAM_014: VFS error types.
//!
//! Defines the error type shared by the VFS collaborator contract and
//! the open-file registry built on top of it.

use core::fmt;

use linux_raw_sys::errno as raw;

/// TEAM_014: VFS error codes.
///
/// These map to standard POSIX errno values at the syscall boundary.
/// Collaborator failures are propagated through this type untouched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VfsError {
    /// Operation not permitted (EPERM)
    PermissionDenied,
    /// No such file or directory (ENOENT)
    NotFound,
    /// I/O error (EIO)
    IoError,
    /// Bad file descriptor, or access mode forbids the operation (EBADF)
    BadFd,
    /// Out of memory (ENOMEM)
    OutOfMemory,
    /// Permission denied (EACCES)
    AccessDenied,
    /// Bad address (EFAULT)
    BadAddress,
    /// Invalid argument (EINVAL)
    InvalidArgument,
    /// Too many open files in system (ENFILE)
    TooManyOpenFiles,
    /// Seek on a handle that does not support it (ESPIPE)
    NotSeekable,
    /// No space left on device (ENOSPC)
    NoSpace,
    /// File name too long (ENAMETOOLONG)
    NameTooLong,
    /// Operation not supported (EOPNOTSUPP)
    NotSupported,
}

impl VfsError {
    /// TEAM_027: Convert to POSIX errno value (negative), using the
    /// authoritative constants rather than hand-copied numbers.
    pub fn to_errno(self) -> i64 {
        let code = match self {
            VfsError::PermissionDenied => raw::EPERM,
            VfsError::NotFound => raw::ENOENT,
            VfsError::IoError => raw::EIO,
            VfsError::BadFd => raw::EBADF,
            VfsError::OutOfMemory => raw::ENOMEM,
            VfsError::AccessDenied => raw::EACCES,
            VfsError::BadAddress => raw::EFAULT,
            VfsError::InvalidArgument => raw::EINVAL,
            VfsError::TooManyOpenFiles => raw::ENFILE,
            VfsError::NotSeekable => raw::ESPIPE,
            VfsError::NoSpace => raw::ENOSPC,
            VfsError::NameTooLong => raw::ENAMETOOLONG,
            VfsError::NotSupported => raw::EOPNOTSUPP,
        };
        -i64::from(code)
    }

    /// Get error name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            VfsError::PermissionDenied => "EPERM",
            VfsError::NotFound => "ENOENT",
            VfsError::IoError => "EIO",
            VfsError::BadFd => "EBADF",
            VfsError::OutOfMemory => "ENOMEM",
            VfsError::AccessDenied => "EACCES",
            VfsError::BadAddress => "EFAULT",
            VfsError::InvalidArgument => "EINVAL",
            VfsError::TooManyOpenFiles => "ENFILE",
            VfsError::NotSeekable => "ESPIPE",
            VfsError::NoSpace => "ENOSPC",
            VfsError::NameTooLong => "ENAMETOOLONG",
            VfsError::NotSupported => "EOPNOTSUPP",
        }
    }
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            VfsError::PermissionDenied => "Operation not permitted",
            VfsError::NotFound => "No such file or directory",
            VfsError::IoError => "I/O error",
            VfsError::BadFd => "Bad file descriptor",
            VfsError::OutOfMemory => "Out of memory",
            VfsError::AccessDenied => "Permission denied",
            VfsError::BadAddress => "Bad address",
            VfsError::InvalidArgument => "Invalid argument",
            VfsError::TooManyOpenFiles => "Too many open files in system",
            VfsError::NotSeekable => "Illegal seek",
            VfsError::NoSpace => "No space left on device",
            VfsError::NameTooLong => "File name too long",
            VfsError::NotSupported => "Operation not supported",
        };
        write!(f, "{} ({})", msg, self.name())
    }
}

/// Result type for VFS operations.
pub type VfsResult<T> = Result<T, VfsError>;
