//! TEAM_023: File syscalls.
//!
//! open/read/write/lseek/close/dup2, plus standard-descriptor setup
//! for freshly created processes.
//!
//! Reference-count discipline for `open`: vnode open, registry
//! register, descriptor bind, in that order, and each failure path
//! undoes exactly the steps already taken.

use alloc::vec;

use crate::fs::file_table::OpenFileId;
use crate::fs::vfs::error::{VfsError, VfsResult};
use crate::fs::vfs::{AccessMode, OpenFlags, SeekWhence};
use crate::kernel::Kernel;
use crate::memory::user;
use crate::syscall::{errno, limits};
use crate::task::fd_table::{FdTable, MAX_FDS};
use crate::task::Process;

fn lookup_fd(proc: &Process, fd: i64) -> Option<OpenFileId> {
    if fd < 0 || fd as usize >= MAX_FDS {
        return None;
    }
    proc.fd(fd as usize)
}

/// open(path, flags, mode) -> fd
pub fn sys_open(kernel: &Kernel, proc: &Process, path_ptr: usize, flags: u32, mode: u32) -> i64 {
    if !user::is_user_ptr(path_ptr) {
        return errno::EFAULT;
    }
    let aspace = proc.addrspace();
    let mut path_buf = vec![0u8; limits::PATH_MAX];
    let len = match kernel.mem().copy_in_str(aspace.as_ref(), path_ptr, &mut path_buf) {
        Ok(len) => len,
        Err(e) => return e.to_errno(),
    };
    let Ok(path) = core::str::from_utf8(&path_buf[..len]) else {
        return errno::EINVAL;
    };

    let access = match AccessMode::from_raw(flags) {
        Ok(a) => a,
        Err(e) => return e.to_errno(),
    };
    let open_flags = OpenFlags::from_raw(flags);
    log::trace!("[SYSCALL] open('{path}', {flags:#o})");

    let vnode = match kernel.vfs().open(path, open_flags, access, mode) {
        Ok(v) => v,
        Err(e) => {
            log::trace!("[SYSCALL] open('{path}') -> {}", e.name());
            return e.to_errno();
        }
    };
    let id = match kernel.open_files().register(vnode.clone(), access) {
        Ok(id) => id,
        Err(e) => {
            vnode.close();
            return e.to_errno();
        }
    };

    let mut fds = proc.fd_table.lock();
    let Some(fd) = fds.alloc() else {
        drop(fds);
        kernel.open_files().release(id);
        return errno::EMFILE;
    };
    fds.bind(fd, id);
    fd as i64
}

/// read(fd, buf, len) -> bytes read
pub fn sys_read(kernel: &Kernel, proc: &Process, fd: i64, buf_ptr: usize, len: usize) -> i64 {
    let Some(id) = lookup_fd(proc, fd) else {
        return errno::EBADF;
    };
    if len == 0 {
        return 0;
    }
    if !user::is_user_range(buf_ptr, len) {
        return errno::EFAULT;
    }
    let len = len.min(limits::MAX_RW_CHUNK);
    let mut kbuf = vec![0u8; len];
    let n = match kernel.open_files().read(id, &mut kbuf) {
        Ok(n) => n,
        Err(e) => return e.to_errno(),
    };
    let aspace = proc.addrspace();
    if let Err(e) = kernel.mem().copy_out(aspace.as_ref(), &kbuf[..n], buf_ptr) {
        return e.to_errno();
    }
    n as i64
}

/// write(fd, buf, len) -> bytes written
pub fn sys_write(kernel: &Kernel, proc: &Process, fd: i64, buf_ptr: usize, len: usize) -> i64 {
    let Some(id) = lookup_fd(proc, fd) else {
        return errno::EBADF;
    };
    if len == 0 {
        return 0;
    }
    if !user::is_user_range(buf_ptr, len) {
        return errno::EFAULT;
    }
    let len = len.min(limits::MAX_RW_CHUNK);
    let mut kbuf = vec![0u8; len];
    let aspace = proc.addrspace();
    if let Err(e) = kernel.mem().copy_in(aspace.as_ref(), buf_ptr, &mut kbuf) {
        return e.to_errno();
    }
    match kernel.open_files().write(id, &kbuf) {
        Ok(n) => n as i64,
        Err(e) => e.to_errno(),
    }
}

/// lseek(fd, offset, whence) -> new offset
pub fn sys_lseek(kernel: &Kernel, proc: &Process, fd: i64, offset: i64, whence: i32) -> i64 {
    let Some(id) = lookup_fd(proc, fd) else {
        return errno::EBADF;
    };
    let Some(whence) = SeekWhence::from_raw(whence) else {
        return errno::EINVAL;
    };
    match kernel.open_files().seek(id, offset, whence) {
        Ok(pos) => pos as i64,
        Err(e) => e.to_errno(),
    }
}

/// close(fd) -> 0
pub fn sys_close(kernel: &Kernel, proc: &Process, fd: i64) -> i64 {
    if fd < 0 || fd as usize >= MAX_FDS {
        return errno::EBADF;
    }
    log::trace!("[SYSCALL] close({fd})");
    match proc.fd_table.lock().close(fd as usize, kernel.open_files()) {
        Ok(()) => 0,
        Err(e) => e.to_errno(),
    }
}

/// dup2(oldfd, newfd) -> newfd
///
/// The whole operation runs under the descriptor-table lock, so no
/// window exists where `newfd` is closed but not yet rebound.
pub fn sys_dup2(kernel: &Kernel, proc: &Process, oldfd: i64, newfd: i64) -> i64 {
    if oldfd < 0 || newfd < 0 {
        return errno::EBADF;
    }
    match proc
        .fd_table
        .lock()
        .dup_to(oldfd as usize, newfd as usize, kernel.open_files())
    {
        Ok(fd) => fd as i64,
        Err(e) => e.to_errno(),
    }
}

/// Open the standard descriptors (0 = stdin read-only, 1 = stdout
/// write-only, 2 = stderr write-only) on the given console path and
/// install them as the process's descriptor table. Any previous table
/// is released; on failure the process's table is untouched.
pub fn init_process_files(kernel: &Kernel, proc: &Process, console: &str) -> VfsResult<()> {
    let mut table = FdTable::new();
    let setup = [
        AccessMode::ReadOnly,
        AccessMode::WriteOnly,
        AccessMode::WriteOnly,
    ];
    for (expected_fd, access) in setup.into_iter().enumerate() {
        match open_into(kernel, &mut table, console, access) {
            Ok(fd) => debug_assert_eq!(fd, expected_fd),
            Err(e) => {
                table.close_all(kernel.open_files());
                return Err(e);
            }
        }
    }
    let mut previous = core::mem::replace(&mut *proc.fd_table.lock(), table);
    previous.close_all(kernel.open_files());
    log::debug!("[SYSCALL] stdio on '{console}' for pid {}", proc.pid());
    Ok(())
}

fn open_into(
    kernel: &Kernel,
    table: &mut FdTable,
    path: &str,
    access: AccessMode,
) -> VfsResult<usize> {
    let vnode = kernel.vfs().open(path, OpenFlags::empty(), access, 0)?;
    let id = match kernel.open_files().register(vnode.clone(), access) {
        Ok(id) => id,
        Err(e) => {
            vnode.close();
            return Err(e);
        }
    };
    let Some(fd) = table.alloc() else {
        kernel.open_files().release(id);
        return Err(VfsError::TooManyOpenFiles);
    };
    table.bind(fd, id);
    Ok(fd)
}
