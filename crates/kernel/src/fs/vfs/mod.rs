//! TEAM_014: VFS collaborator contract.
//!
//! The file subsystem does not implement a filesystem. It drives one
//! through the [`Vfs`] and [`Vnode`] traits below; the concrete
//! implementation is supplied at kernel construction time.

pub mod error;

use alloc::sync::Arc;

use bitflags::bitflags;

use error::{VfsError, VfsResult};

/// Mask covering the access-mode bits of a raw `open(2)` flags word.
pub const O_ACCMODE: u32 = 0o3;

bitflags! {
    /// Open-time behavior flags, access-mode bits excluded.
    ///
    /// The registry never interprets these; they are passed through to
    /// the VFS at open time and not stored afterwards.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const CREATE = 0o100;
        const EXCL   = 0o200;
        const TRUNC  = 0o1000;
        const APPEND = 0o2000;
    }
}

impl OpenFlags {
    /// Extract the behavior flags from a raw flags word, dropping the
    /// access-mode bits and anything we do not recognize.
    pub fn from_raw(raw: u32) -> Self {
        Self::from_bits_truncate(raw & !O_ACCMODE)
    }
}

/// Access mode of an open file, fixed for the lifetime of the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    /// Decode the low two bits of a raw `open(2)` flags word.
    pub fn from_raw(raw: u32) -> VfsResult<Self> {
        match raw & O_ACCMODE {
            0 => Ok(AccessMode::ReadOnly),
            1 => Ok(AccessMode::WriteOnly),
            2 => Ok(AccessMode::ReadWrite),
            _ => Err(VfsError::InvalidArgument),
        }
    }

    pub fn readable(self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

/// Origin for a seek operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekWhence {
    /// Absolute position
    Set,
    /// Relative to the current offset
    Cur,
    /// Relative to end of file
    End,
}

impl SeekWhence {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(SeekWhence::Set),
            1 => Some(SeekWhence::Cur),
            2 => Some(SeekWhence::End),
            _ => None,
        }
    }
}

/// Metadata returned by [`Vnode::stat`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FileStat {
    /// File size in bytes.
    pub size: u64,
}

/// An open file object inside the VFS.
///
/// All I/O is positional; the registry owns the notion of a current
/// offset. Implementations must tolerate concurrent calls.
pub trait Vnode: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`. Returns the
    /// number of bytes read; 0 means end of file.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize>;

    /// Write `buf` starting at `offset`. Returns the number of bytes
    /// written.
    fn write_at(&self, offset: u64, buf: &[u8]) -> VfsResult<usize>;

    /// Query file metadata.
    fn stat(&self) -> VfsResult<FileStat>;

    /// Whether the object has a meaningful position. Console-style
    /// devices return false and reject nothing else.
    fn is_seekable(&self) -> bool {
        true
    }

    /// Called exactly once, when the last registry reference drops.
    fn close(&self);
}

/// Filesystem name resolution, supplied by the kernel's VFS.
pub trait Vfs: Send + Sync {
    /// Resolve `path` and open it, honoring `flags` (creation,
    /// truncation) and checking `access` against the object's
    /// permissions. `mode` applies only when a file is created.
    fn open(
        &self,
        path: &str,
        flags: OpenFlags,
        access: AccessMode,
        mode: u32,
    ) -> VfsResult<Arc<dyn Vnode>>;
}
