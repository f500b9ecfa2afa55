//! TEAM_019: Process identity table.
//!
//! One slot per pid in `[PID_MIN, PID_MAX]` plus the boot slot. A slot
//! is live while its process runs, becomes a zombie at exit (exit
//! status parked for the parent), and is freed either when the parent
//! harvests it through [`ProcessTable::wait`] or, for orphans, when
//! the allocator reclaims it.
//!
//! The table lock is held for every state change. Waiting never holds
//! it: `wait` takes a wait-queue ticket under the lock, drops the
//! lock, and blocks on the ticket, so a wakeup between the two cannot
//! be lost.

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::sched::{ThreadOps, WaitQueue};

use super::{Pid, PID_BOOT, PID_INVALID, PID_MAX, PID_MIN};

/// Why a wait failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitError {
    /// The pid names no process (ESRCH).
    NoSuchProcess,
    /// The pid exists but the caller is not its parent (ECHILD).
    NotChild,
}

struct PidRecord {
    ppid: Pid,
    exited: bool,
    status: i32,
    queue: Arc<dyn WaitQueue>,
}

impl PidRecord {
    /// Exited with no parent left to harvest it; its slot may be
    /// reused by the allocator.
    fn reclaimable(&self) -> bool {
        self.exited && self.ppid == PID_INVALID
    }
}

struct Slots {
    table: Vec<Option<PidRecord>>,
    /// Rotating allocation cursor; pids are not reused immediately.
    cursor: Pid,
    /// Count of non-exited processes.
    live: usize,
}

pub struct ProcessTable {
    slots: Mutex<Slots>,
    sched: Arc<dyn ThreadOps>,
}

impl ProcessTable {
    pub fn new(sched: Arc<dyn ThreadOps>) -> Self {
        Self {
            slots: Mutex::new(Slots {
                table: (0..=PID_MAX).map(|_| None).collect(),
                cursor: PID_MIN,
                live: 0,
            }),
            sched,
        }
    }

    /// Create the boot process record. Called exactly once.
    pub fn create_boot(&self) -> Pid {
        let mut slots = self.slots.lock();
        assert!(slots.table[PID_BOOT].is_none(), "boot process created twice");
        slots.table[PID_BOOT] = Some(PidRecord {
            ppid: PID_INVALID,
            exited: false,
            status: 0,
            queue: self.sched.new_wait_queue(),
        });
        slots.live += 1;
        PID_BOOT
    }

    /// Allocate a pid for a child of `ppid`. Scans from the cursor so
    /// recently freed pids are not handed straight back; exited
    /// orphans found along the way are reclaimed. None when all pids
    /// are taken.
    pub fn create(&self, ppid: Pid) -> Option<Pid> {
        let mut slots = self.slots.lock();
        let span = PID_MAX - PID_MIN + 1;
        let start = slots.cursor;
        for i in 0..span {
            let pid = PID_MIN + (start - PID_MIN + i) % span;
            let free = match &slots.table[pid] {
                None => true,
                Some(rec) => rec.reclaimable(),
            };
            if free {
                slots.table[pid] = Some(PidRecord {
                    ppid,
                    exited: false,
                    status: 0,
                    queue: self.sched.new_wait_queue(),
                });
                slots.cursor = if pid >= PID_MAX { PID_MIN } else { pid + 1 };
                slots.live += 1;
                log::trace!("[PID] alloc {pid} (parent {ppid})");
                return Some(pid);
            }
        }
        None
    }

    /// Block until `pid` exits and harvest its status, freeing the
    /// slot. Only the parent may wait; a second wait on the same pid
    /// finds the slot gone and reports `NoSuchProcess`.
    pub fn wait(&self, pid: Pid, caller: Pid) -> Result<i32, WaitError> {
        loop {
            let mut slots = self.slots.lock();
            let Some(rec) = slots.table.get(pid).and_then(Option::as_ref) else {
                return Err(WaitError::NoSuchProcess);
            };
            if rec.ppid != caller {
                return Err(WaitError::NotChild);
            }
            if rec.exited {
                let status = rec.status;
                slots.table[pid] = None;
                log::trace!("[PID] harvest {pid} status {status}");
                return Ok(status);
            }
            let queue = rec.queue.clone();
            let ticket = queue.prepare();
            drop(slots);
            queue.wait(ticket);
        }
    }

    /// Record `pid`'s exit: park the status, orphan its children, and
    /// wake any waiter. The slot stays allocated until harvested or
    /// reclaimed.
    pub fn exit(&self, pid: Pid, status: i32) {
        let mut slots = self.slots.lock();
        // Children of the exiting process can never be waited on
        // again; mark them reclaimable once they exit.
        for rec in slots.table.iter_mut().flatten() {
            if rec.ppid == pid {
                rec.ppid = PID_INVALID;
            }
        }
        let Some(rec) = slots.table.get_mut(pid).and_then(Option::as_mut) else {
            panic!("exit for unknown pid {pid}");
        };
        assert!(!rec.exited, "double exit for pid {pid}");
        rec.exited = true;
        rec.status = status;
        let queue = rec.queue.clone();
        slots.live -= 1;
        drop(slots);
        queue.wake_all();
    }

    /// Remove a never-run record; used when `fork` unwinds after pid
    /// allocation succeeded but thread creation failed.
    pub fn destroy(&self, pid: Pid) {
        let mut slots = self.slots.lock();
        let Some(rec) = slots.table.get_mut(pid).and_then(Option::take) else {
            panic!("destroy for unknown pid {pid}");
        };
        if !rec.exited {
            slots.live -= 1;
        }
    }

    /// Whether `pid` currently names a slot (live or zombie).
    pub fn exists(&self, pid: Pid) -> bool {
        self.slots
            .lock()
            .table
            .get(pid)
            .is_some_and(Option::is_some)
    }

    /// Number of non-exited processes.
    pub fn live(&self) -> usize {
        self.slots.lock().live
    }
}
