//! TEAM_020: The process structure and lifecycle internals.
//!
//! `fork`, `exec` and `exit` live here as kernel-internal operations;
//! the syscall layer does argument marshalling only and calls down.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::convert::Infallible;
use core::mem::size_of;

use rune_error::define_kernel_error;
use spin::Mutex;

use crate::fs::vfs::error::VfsError;
use crate::fs::vfs::{AccessMode, OpenFlags};
use crate::kernel::Kernel;
use crate::memory::{AddressSpace, MemError};
use crate::sched::{SchedError, TrapFrame};
use crate::task::fd_table::FdTable;

use super::Pid;

define_kernel_error! {
    /// Why a `fork` failed. All map to ENOMEM at the syscall boundary.
    pub enum ForkError(0x03) {
        AddressSpace(MemError) = 0x01 => "Address-space duplication failed",
        PidExhausted = 0x02 => "Process identity table full",
        Thread(SchedError) = 0x03 => "Thread creation failed",
    }
}

define_kernel_error! {
    /// Why an `exec` failed before the point of no return.
    pub enum ExecError(0x04) {
        Memory(MemError) = 0x01 => "Address-space setup failed",
        Image(VfsError) = 0x02 => "Program image open failed",
    }
}

impl ExecError {
    pub fn to_errno(self) -> i64 {
        match self {
            ExecError::Memory(e) => e.to_errno(),
            ExecError::Image(e) => e.to_errno(),
        }
    }
}

/// A process: identity, descriptor table, address space.
///
/// Thread state is the scheduler's business; this structure is what
/// the file and lifecycle operations act on.
pub struct Process {
    pid: Pid,
    name: String,
    pub(crate) fd_table: Mutex<FdTable>,
    aspace: Mutex<Option<Arc<dyn AddressSpace>>>,
}

impl Process {
    pub(crate) fn from_parts(
        pid: Pid,
        name: String,
        fd_table: FdTable,
        aspace: Option<Arc<dyn AddressSpace>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pid,
            name,
            fd_table: Mutex::new(fd_table),
            aspace: Mutex::new(aspace),
        })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry handle bound to `fd`, if any.
    pub fn fd(&self, fd: usize) -> Option<crate::fs::file_table::OpenFileId> {
        self.fd_table.lock().get(fd)
    }

    pub fn open_fds(&self) -> usize {
        self.fd_table.lock().open_count()
    }

    /// The current address space. Panics if the process has none,
    /// which only happens before the harness installs one.
    pub fn addrspace(&self) -> Arc<dyn AddressSpace> {
        self.aspace
            .lock()
            .clone()
            .unwrap_or_else(|| panic!("process {} has no address space", self.pid))
    }

    pub fn set_addrspace(&self, aspace: Arc<dyn AddressSpace>) {
        *self.aspace.lock() = Some(aspace);
    }

    fn swap_addrspace(&self, new: Arc<dyn AddressSpace>) -> Arc<dyn AddressSpace> {
        self.aspace
            .lock()
            .replace(new)
            .unwrap_or_else(|| panic!("process {} has no address space", self.pid))
    }

    fn take_addrspace(&self) -> Option<Arc<dyn AddressSpace>> {
        self.aspace.lock().take()
    }
}

/// Fork the calling process.
///
/// Order matters for unwinding: the expensive address-space copy
/// happens before a pid is claimed, and the pid before the thread, so
/// each failure path only has to undo what came before it.
pub fn fork_process(
    kernel: &Kernel,
    parent: &Process,
    frame: &dyn TrapFrame,
) -> Result<Pid, ForkError> {
    let mut child_frame = frame.snapshot();
    child_frame.set_return_value(0);

    let parent_as = parent.addrspace();
    let child_as = kernel
        .mem()
        .duplicate(parent_as.as_ref())
        .map_err(ForkError::AddressSpace)?;

    let Some(pid) = kernel.pids().create(parent.pid()) else {
        return Err(ForkError::PidExhausted);
    };

    let child_fds = parent.fd_table.lock().clone_for_fork(kernel.open_files());
    let child = Process::from_parts(pid, parent.name.clone(), child_fds, Some(child_as));

    if let Err(e) = kernel.sched().thread_fork(child.clone(), child_frame) {
        child.fd_table.lock().close_all(kernel.open_files());
        kernel.pids().destroy(pid);
        return Err(ForkError::Thread(e));
    }

    log::trace!("[PROC] fork {} -> {}", parent.pid, pid);
    Ok(pid)
}

/// Exit the calling process: publish the status, release every
/// descriptor, drop the address space. The thread itself is torn down
/// by the caller afterwards.
pub fn exit_process(kernel: &Kernel, proc: &Process, status: i32) {
    log::trace!("[PROC] exit {} status {}", proc.pid, status);
    kernel.pids().exit(proc.pid, status);
    proc.fd_table.lock().close_all(kernel.open_files());
    drop(proc.take_addrspace());
}

/// Replace the calling process's image with `path`, passing `args`.
///
/// `path` and `args` are already staged in kernel memory. Every
/// fallible step either happens before the new address space is
/// installed or rolls back to the old one, so on error the caller's
/// image is intact. On success this never returns.
pub fn exec_replace(
    kernel: &Kernel,
    proc: &Process,
    path: &str,
    args: &[Vec<u8>],
) -> Result<Infallible, ExecError> {
    let vnode = kernel
        .vfs()
        .open(path, OpenFlags::empty(), AccessMode::ReadOnly, 0)
        .map_err(ExecError::Image)?;

    let new_as = match kernel.mem().create() {
        Ok(a) => a,
        Err(e) => {
            vnode.close();
            return Err(ExecError::Memory(e));
        }
    };

    let old_as = proc.swap_addrspace(new_as.clone());
    kernel.mem().activate(new_as.as_ref());

    let staged = (|| -> Result<(usize, usize, usize), ExecError> {
        let load_result = kernel.mem().load_executable(new_as.as_ref(), vnode.clone());
        vnode.close();
        let entry = load_result.map_err(ExecError::Memory)?;
        let stack_top = kernel
            .mem()
            .define_stack(new_as.as_ref())
            .map_err(ExecError::Memory)?;
        let (sp, argv) = build_arg_stack(kernel, new_as.as_ref(), args, stack_top)?;
        Ok((entry, sp, argv))
    })();

    match staged {
        Ok((entry, sp, argv)) => {
            // Point of no return: the old image is gone.
            drop(old_as);
            log::trace!("[PROC] exec {} '{}' argc={}", proc.pid, path, args.len());
            kernel.sched().enter_new_process(args.len(), argv, sp, entry)
        }
        Err(e) => {
            let discarded = proc.swap_addrspace(old_as);
            drop(discarded);
            let current = proc.addrspace();
            kernel.mem().activate(current.as_ref());
            Err(e)
        }
    }
}

/// Lay out the argument block on the new user stack: string bytes at
/// the top (in order, copied NUL-terminated), then a 16-byte-aligned,
/// NULL-terminated pointer array below them. Returns the final stack
/// pointer and the user address of the pointer array.
fn build_arg_stack(
    kernel: &Kernel,
    aspace: &dyn AddressSpace,
    args: &[Vec<u8>],
    stack_top: usize,
) -> Result<(usize, usize), ExecError> {
    let mut sp = stack_top;
    let mut arg_ptrs: Vec<usize> = Vec::with_capacity(args.len() + 1);

    for arg in args.iter().rev() {
        sp = sp
            .checked_sub(arg.len() + 1)
            .ok_or(ExecError::Memory(MemError::BadAddress))?;
        let mut bytes = arg.clone();
        bytes.push(0);
        kernel
            .mem()
            .copy_out(aspace, &bytes, sp)
            .map_err(ExecError::Memory)?;
        arg_ptrs.push(sp);
    }
    arg_ptrs.reverse();
    arg_ptrs.push(0);

    let table_bytes = arg_ptrs.len() * size_of::<usize>();
    sp = sp
        .checked_sub(table_bytes)
        .ok_or(ExecError::Memory(MemError::BadAddress))?
        & !0xf;

    let mut table: Vec<u8> = Vec::with_capacity(table_bytes);
    for ptr in &arg_ptrs {
        table.extend_from_slice(&ptr.to_ne_bytes());
    }
    kernel
        .mem()
        .copy_out(aspace, &table, sp)
        .map_err(ExecError::Memory)?;

    Ok((sp, sp))
}
