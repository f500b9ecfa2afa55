//! TEAM_016: Per-process file descriptor table.
//!
//! A fixed array mapping small integers to open-file registry handles.
//! The table itself holds the references; every entry placed here must
//! be paired with exactly one registry reference, and every entry
//! removed must release one.
//!
//! Lock order: callers hold the process's descriptor-table lock and
//! pass the registry in; registry locking nests inside. Descriptor
//! mutations that touch the registry (`close`, `dup_to`, `close_all`)
//! therefore happen atomically with respect to other threads of the
//! same process.

use crate::fs::file_table::{OpenFileId, OpenFileTable};
use crate::fs::vfs::error::{VfsError, VfsResult};

/// Per-process limit on open descriptors.
pub const MAX_FDS: usize = 64;

pub struct FdTable {
    entries: [Option<OpenFileId>; MAX_FDS],
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            entries: [None; MAX_FDS],
        }
    }

    /// Lowest free descriptor, or None when the table is full (EMFILE
    /// at the syscall boundary).
    pub fn alloc(&mut self) -> Option<usize> {
        self.entries.iter().position(Option::is_none)
    }

    /// Install a registry handle at `fd`. The caller transfers one
    /// registry reference into the table.
    pub fn bind(&mut self, fd: usize, id: OpenFileId) {
        debug_assert!(self.entries[fd].is_none(), "bind over live fd {fd}");
        self.entries[fd] = Some(id);
    }

    pub fn get(&self, fd: usize) -> Option<OpenFileId> {
        self.entries.get(fd).copied().flatten()
    }

    /// Unbind `fd` and release its registry reference.
    pub fn close(&mut self, fd: usize, files: &OpenFileTable) -> VfsResult<()> {
        let slot = self.entries.get_mut(fd).ok_or(VfsError::BadFd)?;
        let id = slot.take().ok_or(VfsError::BadFd)?;
        files.release(id);
        Ok(())
    }

    /// `dup2` semantics: make `newfd` name the same record as `oldfd`,
    /// closing whatever `newfd` held. `dup_to(n, n)` on a live fd is a
    /// no-op. The retain happens before the old entry is released so
    /// the record can never transit through zero.
    pub fn dup_to(&mut self, oldfd: usize, newfd: usize, files: &OpenFileTable) -> VfsResult<usize> {
        if oldfd >= MAX_FDS || newfd >= MAX_FDS {
            return Err(VfsError::BadFd);
        }
        let id = self.entries[oldfd].ok_or(VfsError::BadFd)?;
        if oldfd == newfd {
            return Ok(newfd);
        }
        files.retain(id);
        if let Some(prev) = self.entries[newfd].take() {
            files.release(prev);
        }
        self.entries[newfd] = Some(id);
        Ok(newfd)
    }

    /// Copy for `fork`: same descriptors, one extra registry reference
    /// per live entry. Never a plain memcpy of the array.
    pub fn clone_for_fork(&self, files: &OpenFileTable) -> Self {
        for id in self.entries.iter().flatten() {
            files.retain(*id);
        }
        Self {
            entries: self.entries,
        }
    }

    /// Release every live entry; used at process exit and when a
    /// half-built child is torn down.
    pub fn close_all(&mut self, files: &OpenFileTable) {
        for slot in &mut self.entries {
            if let Some(id) = slot.take() {
                files.release(id);
            }
        }
    }

    pub fn open_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}
