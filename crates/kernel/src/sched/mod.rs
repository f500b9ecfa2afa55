//! TEAM_017: Thread and scheduler collaborator contracts.
//!
//! Process lifecycle needs four things from the scheduler: wait
//! queues, a way to launch a forked child thread, a one-way door into
//! user mode after `exec`, and thread termination. All four are
//! behind traits so the subsystem can be driven by the real scheduler
//! in the kernel and by harnesses on a host.

use alloc::boxed::Box;
use alloc::sync::Arc;

use rune_error::define_kernel_error;

use crate::task::Process;

define_kernel_error! {
    /// Thread creation failures surfaced to `fork`.
    pub enum SchedError(0x02) {
        Exhausted = 0x01 => "No thread slots available",
    }
}

/// Saved user register state at a syscall trap.
///
/// `fork` snapshots the parent's frame, patches the return value to 0
/// and hands the copy to the child thread.
pub trait TrapFrame: Send {
    fn snapshot(&self) -> Box<dyn TrapFrame>;
    fn set_return_value(&mut self, value: u64);
}

/// Sleep/wakeup channel with event-count semantics.
///
/// The lost-wakeup-free protocol: call [`prepare`](WaitQueue::prepare)
/// while holding the lock that guards the awaited condition, drop the
/// lock, then call [`wait`](WaitQueue::wait) with the ticket. A
/// [`wake_all`](WaitQueue::wake_all) that lands between the two
/// invalidates the ticket and `wait` returns immediately.
pub trait WaitQueue: Send + Sync {
    /// Take a ticket for the current generation.
    fn prepare(&self) -> u64;
    /// Block until the generation moves past `ticket`.
    fn wait(&self, ticket: u64);
    /// Advance the generation and wake every waiter.
    fn wake_all(&self);
}

/// Scheduler operations used by fork/exec/exit.
pub trait ThreadOps: Send + Sync {
    fn new_wait_queue(&self) -> Arc<dyn WaitQueue>;

    /// Start a thread running `child` in user mode with the given
    /// register state. On error nothing has been scheduled and the
    /// caller unwinds the half-built child.
    fn thread_fork(&self, child: Arc<Process>, frame: Box<dyn TrapFrame>) -> Result<(), SchedError>;

    /// Jump to user mode in the current thread's (new) address space.
    /// Does not return.
    fn enter_new_process(&self, argc: usize, argv: usize, stack_ptr: usize, entry: usize) -> !;

    /// Terminate the current thread. Does not return.
    fn thread_exit(&self) -> !;
}
