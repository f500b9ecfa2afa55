//! TEAM_018: Memory-management collaborator contracts.
//!
//! Address spaces, executable loading and user/kernel copies are
//! someone else's machinery; this module defines the seam the file
//! and process subsystem drives it through.

pub mod user;

use alloc::sync::Arc;
use core::any::Any;

use rune_error::define_kernel_error;

use crate::fs::vfs::Vnode;
use crate::syscall::errno;

define_kernel_error! {
    /// Memory collaborator failures.
    pub enum MemError(0x01) {
        OutOfMemory = 0x01 => "Out of memory",
        BadAddress = 0x02 => "Bad user-space address",
        StringTooLong = 0x03 => "String exceeds staging buffer",
        BadExecutable = 0x04 => "Executable image rejected",
    }
}

impl MemError {
    /// Negative errno for the syscall boundary.
    pub fn to_errno(self) -> i64 {
        match self {
            MemError::OutOfMemory => errno::ENOMEM,
            MemError::BadAddress => errno::EFAULT,
            MemError::StringTooLong => errno::ENAMETOOLONG,
            MemError::BadExecutable => errno::ENOEXEC,
        }
    }
}

/// Opaque handle to one process's address space.
pub trait AddressSpace: Send + Sync {
    /// Downcast hook for the concrete implementation.
    fn as_any(&self) -> &dyn Any;
}

/// Operations on address spaces.
pub trait MemoryOps: Send + Sync {
    /// A fresh, empty address space.
    fn create(&self) -> Result<Arc<dyn AddressSpace>, MemError>;

    /// Deep copy for `fork`.
    fn duplicate(&self, src: &dyn AddressSpace) -> Result<Arc<dyn AddressSpace>, MemError>;

    /// Make `aspace` the one translations go through on this CPU.
    fn activate(&self, aspace: &dyn AddressSpace);

    /// Map `image` into `aspace`; returns the entry point.
    fn load_executable(
        &self,
        aspace: &dyn AddressSpace,
        image: Arc<dyn Vnode>,
    ) -> Result<usize, MemError>;

    /// Set up the user stack region; returns the initial stack top.
    fn define_stack(&self, aspace: &dyn AddressSpace) -> Result<usize, MemError>;

    /// Copy bytes from user address `src` into `dst`.
    fn copy_in(&self, aspace: &dyn AddressSpace, src: usize, dst: &mut [u8]) -> Result<(), MemError>;

    /// Copy `src` to user address `dst`.
    fn copy_out(&self, aspace: &dyn AddressSpace, src: &[u8], dst: usize) -> Result<(), MemError>;

    /// Copy a NUL-terminated string from user address `src`. Returns
    /// the length excluding the terminator, or `StringTooLong` if no
    /// NUL appears within `dst`.
    fn copy_in_str(
        &self,
        aspace: &dyn AddressSpace,
        src: usize,
        dst: &mut [u8],
    ) -> Result<usize, MemError>;
}
