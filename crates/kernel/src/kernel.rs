//! TEAM_021: Kernel state root.
//!
//! Owns the two global registries and the collaborator handles. One
//! instance exists in a running kernel; tests build as many as they
//! like.

use alloc::string::String;
use alloc::sync::Arc;

use crate::fs::file_table::OpenFileTable;
use crate::fs::vfs::Vfs;
use crate::memory::MemoryOps;
use crate::sched::ThreadOps;
use crate::task::fd_table::FdTable;
use crate::task::process_table::ProcessTable;
use crate::task::{Pid, Process};

pub struct Kernel {
    open_files: OpenFileTable,
    pids: ProcessTable,
    vfs: Arc<dyn Vfs>,
    mem: Arc<dyn MemoryOps>,
    sched: Arc<dyn ThreadOps>,
}

impl Kernel {
    pub fn new(vfs: Arc<dyn Vfs>, mem: Arc<dyn MemoryOps>, sched: Arc<dyn ThreadOps>) -> Self {
        Self {
            open_files: OpenFileTable::new(),
            pids: ProcessTable::new(sched.clone()),
            vfs,
            mem,
            sched,
        }
    }

    pub fn open_files(&self) -> &OpenFileTable {
        &self.open_files
    }

    pub fn pids(&self) -> &ProcessTable {
        &self.pids
    }

    pub fn vfs(&self) -> &dyn Vfs {
        self.vfs.as_ref()
    }

    pub fn mem(&self) -> &dyn MemoryOps {
        self.mem.as_ref()
    }

    pub fn sched(&self) -> &dyn ThreadOps {
        self.sched.as_ref()
    }

    /// Create the boot process. Its address space and standard
    /// descriptors are installed separately during startup.
    pub fn boot_process(&self, name: &str) -> Arc<Process> {
        let pid = self.pids.create_boot();
        log::info!("[KERNEL] boot process '{name}' pid {pid}");
        Process::from_parts(pid, String::from(name), FdTable::new(), None)
    }

    /// Create a process as a child of `parent`, with an empty
    /// descriptor table. None when the pid space is exhausted.
    pub fn create_process(&self, name: &str, parent: Pid) -> Option<Arc<Process>> {
        let pid = self.pids.create(parent)?;
        Some(Process::from_parts(pid, String::from(name), FdTable::new(), None))
    }
}
