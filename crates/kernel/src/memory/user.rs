//! User-pointer range checks.
//!
//! Pointer arguments are screened here before any copy is attempted;
//! the memory collaborator still faults cleanly on unmapped pages, but
//! NULL and kernel addresses never reach it.

/// First address above the user-accessible range.
pub const USER_SPACE_TOP: usize = 0x8000_0000;

/// NULL and kernel pointers are never valid user pointers.
pub fn is_user_ptr(addr: usize) -> bool {
    addr != 0 && addr < USER_SPACE_TOP
}

/// Whether `[addr, addr + len)` lies entirely in user space.
pub fn is_user_range(addr: usize, len: usize) -> bool {
    if addr == 0 {
        return false;
    }
    match addr.checked_add(len) {
        Some(end) => end <= USER_SPACE_TOP,
        None => false,
    }
}
