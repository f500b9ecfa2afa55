//! Multi-process file I/O and process lifecycle.
//!
//! The system-wide open-file registry, per-process descriptor tables,
//! the pid table, and the syscalls over them: open/read/write/lseek/
//! close/dup2 and fork/execv/waitpid/getpid/_exit. Filesystems,
//! address spaces and threads are collaborators reached through
//! traits; see [`fs::vfs`], [`memory`] and [`sched`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod fs;
pub mod kernel;
pub mod memory;
pub mod sched;
pub mod syscall;
pub mod task;

pub use kernel::Kernel;

#[cfg(test)]
pub(crate) mod testutil;
