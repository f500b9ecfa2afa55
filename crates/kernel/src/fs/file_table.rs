//! TEAM_015: System-wide open-file registry.
//!
//! Every successful `open` creates one record here; descriptor tables
//! hold [`OpenFileId`] handles into it. A record is shared across
//! processes after `fork` and after `dup2`, so the file offset lives
//! in the record, not in any descriptor table.
//!
//! Locking: the registry lock covers slot allocation and reference
//! counts only. Each record carries its own lock for the offset, so
//! I/O on one file never stalls opens and closes of others. The
//! registry lock is the innermost lock in the subsystem; nothing is
//! acquired while it is held.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use super::vfs::{AccessMode, SeekWhence, Vnode};
use super::vfs::error::{VfsError, VfsResult};

/// System-wide limit on simultaneously open files.
pub const OPEN_MAX: usize = 128;

/// Opaque handle naming a registry slot. Carries the slot's
/// generation so a handle left over from a closed record can never
/// alias a record that later reuses the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenFileId {
    index: usize,
    generation: u64,
}

impl OpenFileId {
    pub fn index(self) -> usize {
        self.index
    }
}

/// Mutable per-record state, guarded by the record lock.
struct FileState {
    offset: u64,
    /// Set by the final `release` before the vnode is closed. A
    /// lookup that raced that release still holds the record `Arc`;
    /// this flag keeps it from reaching the dead vnode.
    closed: bool,
}

/// One open file: the vnode, the fixed access mode, the shared offset
/// and the descriptor reference count.
pub struct OpenFile {
    vnode: Arc<dyn Vnode>,
    access: AccessMode,
    state: Mutex<FileState>,
    // Only touched while the registry lock is held; atomic so the
    // record stays Sync without widening that lock.
    refs: AtomicUsize,
}

impl OpenFile {
    pub fn access(&self) -> AccessMode {
        self.access
    }
}

struct Slot {
    /// Bumped every time the slot's record is freed.
    generation: u64,
    file: Option<Arc<OpenFile>>,
}

/// The registry: a fixed-size slot array behind a single lock.
pub struct OpenFileTable {
    slots: Mutex<Vec<Slot>>,
}

impl OpenFileTable {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(
                (0..OPEN_MAX)
                    .map(|_| Slot {
                        generation: 0,
                        file: None,
                    })
                    .collect(),
            ),
        }
    }

    /// Enter a freshly opened vnode into the registry with one
    /// reference. On `TooManyOpenFiles` the caller still owns the
    /// vnode and must close it.
    pub fn register(&self, vnode: Arc<dyn Vnode>, access: AccessMode) -> VfsResult<OpenFileId> {
        let mut slots = self.slots.lock();
        let Some(index) = slots.iter().position(|s| s.file.is_none()) else {
            return Err(VfsError::TooManyOpenFiles);
        };
        slots[index].file = Some(Arc::new(OpenFile {
            vnode,
            access,
            state: Mutex::new(FileState {
                offset: 0,
                closed: false,
            }),
            refs: AtomicUsize::new(1),
        }));
        log::trace!("[FILE] register slot {index} ({access:?})");
        Ok(OpenFileId {
            index,
            generation: slots[index].generation,
        })
    }

    /// Add a descriptor reference. Callers must already hold one;
    /// a dead handle here is a bookkeeping bug, not a user error.
    pub fn retain(&self, id: OpenFileId) {
        let slots = self.slots.lock();
        let slot = &slots[id.index];
        assert!(
            slot.generation == id.generation && slot.file.is_some(),
            "retain on dead open-file slot {}",
            id.index
        );
        if let Some(file) = &slot.file {
            file.refs.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop a descriptor reference. The last reference frees the slot
    /// and closes the vnode, after waiting out any in-flight I/O on
    /// the record.
    pub fn release(&self, id: OpenFileId) {
        let mut slots = self.slots.lock();
        let slot = &mut slots[id.index];
        assert_eq!(
            slot.generation, id.generation,
            "release on recycled open-file slot {}",
            id.index
        );
        let Some(file) = slot.file.clone() else {
            panic!("release on dead open-file slot {}", id.index);
        };
        let prev = file.refs.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev >= 1);
        if prev > 1 {
            return;
        }
        slot.file = None;
        slot.generation += 1;
        drop(slots);
        // Serialize with any reader/writer still holding the record
        // lock, and mark the record dead for anyone whose lookup
        // completed before the slot was freed.
        file.state.lock().closed = true;
        log::trace!("[FILE] close slot {}", id.index);
        file.vnode.close();
    }

    fn lookup(&self, id: OpenFileId) -> VfsResult<Arc<OpenFile>> {
        let slots = self.slots.lock();
        let slot = slots.get(id.index).ok_or(VfsError::BadFd)?;
        if slot.generation != id.generation {
            return Err(VfsError::BadFd);
        }
        slot.file.clone().ok_or(VfsError::BadFd)
    }

    /// Read at the shared offset, advancing it by the amount actually
    /// transferred. Holding the record lock across the vnode call is
    /// what makes concurrent readers see disjoint ranges.
    pub fn read(&self, id: OpenFileId, buf: &mut [u8]) -> VfsResult<usize> {
        let file = self.lookup(id)?;
        if !file.access.readable() {
            return Err(VfsError::BadFd);
        }
        let mut state = file.state.lock();
        if state.closed {
            return Err(VfsError::BadFd);
        }
        let n = file.vnode.read_at(state.offset, buf)?;
        state.offset += n as u64;
        Ok(n)
    }

    /// Write at the shared offset, advancing it by the amount actually
    /// transferred.
    pub fn write(&self, id: OpenFileId, buf: &[u8]) -> VfsResult<usize> {
        let file = self.lookup(id)?;
        if !file.access.writable() {
            return Err(VfsError::BadFd);
        }
        let mut state = file.state.lock();
        if state.closed {
            return Err(VfsError::BadFd);
        }
        let n = file.vnode.write_at(state.offset, buf)?;
        state.offset += n as u64;
        Ok(n)
    }

    /// Reposition the shared offset. Seeking past end of file is
    /// legal; a resulting position below zero or above `i64::MAX`
    /// (unrepresentable at the syscall boundary) is not.
    pub fn seek(&self, id: OpenFileId, offset: i64, whence: SeekWhence) -> VfsResult<u64> {
        let file = self.lookup(id)?;
        let mut state = file.state.lock();
        if state.closed {
            return Err(VfsError::BadFd);
        }
        if !file.vnode.is_seekable() {
            return Err(VfsError::NotSeekable);
        }
        let new_offset = match whence {
            SeekWhence::Set => {
                if offset < 0 {
                    return Err(VfsError::InvalidArgument);
                }
                offset as u64
            }
            SeekWhence::Cur => offset_from(state.offset, offset)?,
            SeekWhence::End => {
                let size = file.vnode.stat()?.size;
                offset_from(size, offset)?
            }
        };
        state.offset = new_offset;
        Ok(new_offset)
    }

    /// Current descriptor reference count, None once the record is
    /// gone.
    pub fn ref_count(&self, id: OpenFileId) -> Option<usize> {
        let slots = self.slots.lock();
        let slot = &slots[id.index];
        if slot.generation != id.generation {
            return None;
        }
        slot.file.as_ref().map(|f| f.refs.load(Ordering::Relaxed))
    }

    /// Access mode of a live record.
    pub fn access(&self, id: OpenFileId) -> VfsResult<AccessMode> {
        Ok(self.lookup(id)?.access)
    }

    /// Number of live records, for diagnostics and tests.
    pub fn live_records(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.file.is_some()).count()
    }
}

impl Default for OpenFileTable {
    fn default() -> Self {
        Self::new()
    }
}

fn offset_from(base: u64, delta: i64) -> VfsResult<u64> {
    let result = if delta < 0 {
        base.checked_sub(delta.unsigned_abs())
    } else {
        base.checked_add(delta as u64)
    };
    match result {
        // Offsets travel as i64 through the syscall boundary; a
        // position that would read back negative is no position.
        Some(pos) if pos <= i64::MAX as u64 => Ok(pos),
        _ => Err(VfsError::InvalidArgument),
    }
}
