//! TEAM_024: Process syscalls.
//!
//! getpid/fork/execv/waitpid/_exit. The heavy lifting lives in
//! [`crate::task::process`]; this layer validates arguments, stages
//! user memory, and maps internal errors to errnos.

use alloc::vec;
use alloc::vec::Vec;

use linux_raw_sys::general::{WNOHANG, WUNTRACED};

use crate::kernel::Kernel;
use crate::memory::user;
use crate::memory::MemError;
use crate::sched::TrapFrame;
use crate::syscall::{errno, limits};
use crate::task::process::{self, ForkError};
use crate::task::process_table::WaitError;
use crate::task::{Pid, Process, PID_MAX, PID_MIN};

/// getpid() -> pid. Cannot fail.
pub fn sys_getpid(proc: &Process) -> i64 {
    proc.pid() as i64
}

/// fork(frame) -> child pid (parent), 0 (child via patched frame)
pub fn sys_fork(kernel: &Kernel, proc: &Process, frame: &dyn TrapFrame) -> i64 {
    log::trace!("[SYSCALL] fork (pid {})", proc.pid());
    match process::fork_process(kernel, proc, frame) {
        Ok(pid) => pid as i64,
        Err(e) => {
            log::debug!("[SYSCALL] fork failed: {e}");
            // Every fork failure is a resource failure.
            match e {
                ForkError::AddressSpace(_) | ForkError::PidExhausted | ForkError::Thread(_) => {
                    errno::ENOMEM
                }
            }
        }
    }
}

/// _exit(status) -> never
pub fn sys_exit(kernel: &Kernel, proc: &Process, status: i32) -> ! {
    process::exit_process(kernel, proc, status);
    kernel.sched().thread_exit()
}

/// waitpid(pid, status_ptr, options) -> pid
///
/// Options are validated against the known set and then ignored; the
/// wait is always blocking. A NULL status pointer discards the status
/// rather than faulting.
pub fn sys_waitpid(
    kernel: &Kernel,
    proc: &Process,
    pid: i64,
    status_ptr: usize,
    options: u32,
) -> i64 {
    if pid < PID_MIN as i64 || pid > PID_MAX as i64 {
        return errno::ESRCH;
    }
    if options != 0 && options != WNOHANG && options != WUNTRACED {
        return errno::EINVAL;
    }
    if status_ptr != 0 && !user::is_user_range(status_ptr, core::mem::size_of::<i32>()) {
        return errno::EFAULT;
    }

    let status = match kernel.pids().wait(pid as Pid, proc.pid()) {
        Ok(status) => status,
        Err(WaitError::NoSuchProcess) => return errno::ESRCH,
        Err(WaitError::NotChild) => return errno::ECHILD,
    };

    if status_ptr != 0 {
        let aspace = proc.addrspace();
        if let Err(e) = kernel
            .mem()
            .copy_out(aspace.as_ref(), &status.to_ne_bytes(), status_ptr)
        {
            return e.to_errno();
        }
    }
    log::trace!("[SYSCALL] waitpid({pid}) -> status {status}");
    pid
}

/// execv(prog, argv) -> never on success, errno on failure
pub fn sys_execv(kernel: &Kernel, proc: &Process, prog_ptr: usize, argv_ptr: usize) -> i64 {
    if !user::is_user_ptr(prog_ptr) || !user::is_user_ptr(argv_ptr) {
        return errno::EFAULT;
    }
    let aspace = proc.addrspace();

    let mut path_buf = vec![0u8; limits::PATH_MAX];
    let path_len = match kernel.mem().copy_in_str(aspace.as_ref(), prog_ptr, &mut path_buf) {
        Ok(len) => len,
        Err(e) => return e.to_errno(),
    };
    if path_len == 0 {
        return errno::ENOEXEC;
    }
    let Ok(path) = core::str::from_utf8(&path_buf[..path_len]) else {
        return errno::EINVAL;
    };

    let args = match stage_argv(kernel, proc, argv_ptr) {
        Ok(args) => args,
        Err(code) => return code,
    };

    log::trace!("[SYSCALL] execv('{path}', argc={})", args.len());
    match process::exec_replace(kernel, proc, path, &args) {
        Ok(never) => match never {},
        Err(e) => {
            log::debug!("[SYSCALL] execv('{path}') failed: {e}");
            e.to_errno()
        }
    }
}

/// Walk the user argv array and copy each string into kernel memory.
/// The total staged size, NUL terminators included, is capped at
/// `ARG_MAX`.
fn stage_argv(kernel: &Kernel, proc: &Process, argv_ptr: usize) -> Result<Vec<Vec<u8>>, i64> {
    let aspace = proc.addrspace();
    let ptr_size = core::mem::size_of::<usize>();
    let mut args: Vec<Vec<u8>> = Vec::new();
    let mut staged = 0usize;

    for index in 0usize.. {
        let Some(slot) = index
            .checked_mul(ptr_size)
            .and_then(|off| argv_ptr.checked_add(off))
        else {
            return Err(errno::EFAULT);
        };
        if !user::is_user_range(slot, ptr_size) {
            return Err(errno::EFAULT);
        }
        let mut raw = [0u8; core::mem::size_of::<usize>()];
        if let Err(e) = kernel.mem().copy_in(aspace.as_ref(), slot, &mut raw) {
            return Err(e.to_errno());
        }
        let arg_ptr = usize::from_ne_bytes(raw);
        if arg_ptr == 0 {
            break;
        }
        if !user::is_user_ptr(arg_ptr) {
            return Err(errno::EFAULT);
        }

        let room = limits::ARG_MAX - staged;
        if room == 0 {
            return Err(errno::E2BIG);
        }
        let mut buf = vec![0u8; room];
        let len = match kernel.mem().copy_in_str(aspace.as_ref(), arg_ptr, &mut buf) {
            Ok(len) => len,
            // No NUL within the remaining budget.
            Err(MemError::StringTooLong) => return Err(errno::E2BIG),
            Err(e) => return Err(e.to_errno()),
        };
        staged += len + 1;
        if staged > limits::ARG_MAX {
            return Err(errno::E2BIG);
        }
        buf.truncate(len);
        args.push(buf);
    }
    Ok(args)
}
