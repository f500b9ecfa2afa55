//! File subsystem: the VFS contract and the system-wide open-file
//! registry built on it.

pub mod file_table;
pub mod vfs;
