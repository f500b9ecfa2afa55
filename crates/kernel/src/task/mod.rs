//! Task management: process identities, descriptor tables, and the
//! lifecycle operations built on them.

pub mod fd_table;
pub mod process;
pub mod process_table;

pub use process::Process;

/// Process identifier.
pub type Pid = usize;

/// Reserved: never assigned, used as the "no parent" marker.
pub const PID_INVALID: Pid = 0;
/// The boot process, created once at startup.
pub const PID_BOOT: Pid = 1;
/// Lowest pid handed out by the allocator.
pub const PID_MIN: Pid = 2;
/// Highest valid pid, inclusive.
pub const PID_MAX: Pid = 255;
