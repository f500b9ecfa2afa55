//! Host-side fakes for the collaborator traits, shared by the unit
//! tests. The integration suites carry their own threaded variants.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::boxed::Box;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::fs::file_table::OpenFileId;
use crate::fs::vfs::error::{VfsError, VfsResult};
use crate::fs::vfs::{AccessMode, FileStat, OpenFlags, Vfs, Vnode};
use crate::kernel::Kernel;
use crate::memory::{AddressSpace, MemError, MemoryOps};
use crate::sched::{SchedError, ThreadOps, TrapFrame, WaitQueue};
use crate::task::Process;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// In-memory vnode that counts close calls and flags any I/O that
/// arrives after the close.
pub struct CountingVnode {
    data: Mutex<Vec<u8>>,
    closed: AtomicUsize,
    late_io: AtomicBool,
    seekable: bool,
}

impl CountingVnode {
    pub fn with_data(data: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(data.to_vec()),
            closed: AtomicUsize::new(0),
            late_io: AtomicBool::new(false),
            seekable: true,
        })
    }

    /// Console-style device: unseekable, reads empty, swallows writes.
    pub fn console() -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(Vec::new()),
            closed: AtomicUsize::new(0),
            late_io: AtomicBool::new(false),
            seekable: false,
        })
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn saw_late_io(&self) -> bool {
        self.late_io.load(Ordering::SeqCst)
    }

    pub fn contents(&self) -> Vec<u8> {
        locked(&self.data).clone()
    }

    fn note_io(&self) {
        if self.closed.load(Ordering::SeqCst) > 0 {
            self.late_io.store(true, Ordering::SeqCst);
        }
    }
}

impl Vnode for CountingVnode {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        self.note_io();
        let data = locked(&self.data);
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> VfsResult<usize> {
        self.note_io();
        let mut data = locked(&self.data);
        let offset = offset as usize;
        if data.len() < offset + buf.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn stat(&self) -> VfsResult<FileStat> {
        Ok(FileStat {
            size: locked(&self.data).len() as u64,
        })
    }

    fn is_seekable(&self) -> bool {
        self.seekable
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Path-to-vnode map standing in for a real filesystem.
#[derive(Default)]
pub struct FakeVfs {
    files: Mutex<BTreeMap<String, Arc<CountingVnode>>>,
}

impl FakeVfs {
    pub fn add(&self, path: &str, vnode: Arc<CountingVnode>) {
        locked(&self.files).insert(String::from(path), vnode);
    }

    pub fn vnode(&self, path: &str) -> Option<Arc<CountingVnode>> {
        locked(&self.files).get(path).cloned()
    }
}

impl Vfs for FakeVfs {
    fn open(
        &self,
        path: &str,
        _flags: OpenFlags,
        _access: AccessMode,
        _mode: u32,
    ) -> VfsResult<Arc<dyn Vnode>> {
        match locked(&self.files).get(path) {
            Some(vnode) => Ok(vnode.clone()),
            None => Err(VfsError::NotFound),
        }
    }
}

/// Sparse byte map standing in for user memory.
#[derive(Default)]
pub struct FakeAddrSpace {
    bytes: Mutex<BTreeMap<usize, u8>>,
}

impl AddressSpace for FakeAddrSpace {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn fake_space(aspace: &dyn AddressSpace) -> &FakeAddrSpace {
    aspace
        .as_any()
        .downcast_ref::<FakeAddrSpace>()
        .unwrap_or_else(|| panic!("foreign address space"))
}

#[derive(Default)]
pub struct FakeMem;

impl MemoryOps for FakeMem {
    fn create(&self) -> Result<Arc<dyn AddressSpace>, MemError> {
        Ok(Arc::new(FakeAddrSpace::default()))
    }

    fn duplicate(&self, src: &dyn AddressSpace) -> Result<Arc<dyn AddressSpace>, MemError> {
        let copy = FakeAddrSpace {
            bytes: Mutex::new(locked(&fake_space(src).bytes).clone()),
        };
        Ok(Arc::new(copy))
    }

    fn activate(&self, _aspace: &dyn AddressSpace) {}

    fn load_executable(
        &self,
        _aspace: &dyn AddressSpace,
        image: Arc<dyn Vnode>,
    ) -> Result<usize, MemError> {
        let stat = image.stat().map_err(|_| MemError::BadExecutable)?;
        if stat.size == 0 {
            return Err(MemError::BadExecutable);
        }
        Ok(0x40_0000)
    }

    fn define_stack(&self, _aspace: &dyn AddressSpace) -> Result<usize, MemError> {
        Ok(0x7FFF_F000)
    }

    fn copy_in(&self, aspace: &dyn AddressSpace, src: usize, dst: &mut [u8]) -> Result<(), MemError> {
        let bytes = locked(&fake_space(aspace).bytes);
        for (i, slot) in dst.iter_mut().enumerate() {
            *slot = bytes.get(&(src + i)).copied().unwrap_or(0);
        }
        Ok(())
    }

    fn copy_out(&self, aspace: &dyn AddressSpace, src: &[u8], dst: usize) -> Result<(), MemError> {
        let mut bytes = locked(&fake_space(aspace).bytes);
        for (i, b) in src.iter().enumerate() {
            bytes.insert(dst + i, *b);
        }
        Ok(())
    }

    fn copy_in_str(
        &self,
        aspace: &dyn AddressSpace,
        src: usize,
        dst: &mut [u8],
    ) -> Result<usize, MemError> {
        let bytes = locked(&fake_space(aspace).bytes);
        for i in 0..dst.len() {
            let b = bytes.get(&(src + i)).copied().unwrap_or(0);
            if b == 0 {
                return Ok(i);
            }
            dst[i] = b;
        }
        Err(MemError::StringTooLong)
    }
}

/// Event-count wait queue over a condvar.
#[derive(Default)]
pub struct CondvarQueue {
    generation: Mutex<u64>,
    cv: Condvar,
}

impl WaitQueue for CondvarQueue {
    fn prepare(&self) -> u64 {
        *locked(&self.generation)
    }

    fn wait(&self, ticket: u64) {
        let mut generation = locked(&self.generation);
        while *generation == ticket {
            generation = self
                .cv
                .wait(generation)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    fn wake_all(&self) {
        *locked(&self.generation) += 1;
        self.cv.notify_all();
    }
}

/// Records forked children; no threads are started.
#[derive(Default)]
pub struct FakeSched {
    children: Mutex<Vec<Arc<Process>>>,
    fail_next: AtomicBool,
}

impl FakeSched {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_fork(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn last_forked(&self) -> Option<Arc<Process>> {
        locked(&self.children).last().cloned()
    }
}

impl ThreadOps for FakeSched {
    fn new_wait_queue(&self) -> Arc<dyn WaitQueue> {
        Arc::new(CondvarQueue::default())
    }

    fn thread_fork(&self, child: Arc<Process>, _frame: Box<dyn TrapFrame>) -> Result<(), SchedError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SchedError::Exhausted);
        }
        locked(&self.children).push(child);
        Ok(())
    }

    fn enter_new_process(&self, argc: usize, argv: usize, stack_ptr: usize, entry: usize) -> ! {
        panic!("enter_new_process argc={argc} argv={argv:#x} sp={stack_ptr:#x} entry={entry:#x}")
    }

    fn thread_exit(&self) -> ! {
        panic!("thread_exit")
    }
}

/// Trap frame capturing return-value patches.
pub struct TestFrame {
    value: u64,
    patched: Arc<Mutex<Option<u64>>>,
}

impl TestFrame {
    pub fn with_return_value(value: u64) -> Self {
        Self {
            value,
            patched: Arc::new(Mutex::new(None)),
        }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    /// The value most recently written into any snapshot of this
    /// frame.
    pub fn last_patched(&self) -> Option<u64> {
        *locked(&self.patched)
    }
}

impl TrapFrame for TestFrame {
    fn snapshot(&self) -> Box<dyn TrapFrame> {
        Box::new(TestFrame {
            value: self.value,
            patched: self.patched.clone(),
        })
    }

    fn set_return_value(&mut self, value: u64) {
        self.value = value;
        *locked(&self.patched) = Some(value);
    }
}

/// A kernel wired to fakes, plus handles to reach into them.
pub struct Fixture {
    pub kernel: Kernel,
    pub vfs: Arc<FakeVfs>,
    pub mem: Arc<FakeMem>,
    pub sched: Arc<FakeSched>,
}

pub fn kernel_fixture() -> Fixture {
    let vfs = Arc::new(FakeVfs::default());
    let mem = Arc::new(FakeMem);
    let sched = Arc::new(FakeSched::new());
    let kernel = Kernel::new(vfs.clone(), mem.clone(), sched.clone());
    Fixture {
        kernel,
        vfs,
        mem,
        sched,
    }
}

impl Fixture {
    pub fn boot_with_aspace(&self, name: &str) -> Arc<Process> {
        let proc = self.kernel.boot_process(name);
        self.install_aspace(&proc);
        proc
    }

    pub fn spawn_child(&self, parent: &Process, name: &str) -> Arc<Process> {
        let proc = self
            .kernel
            .create_process(name, parent.pid())
            .unwrap_or_else(|| panic!("pid space exhausted"));
        self.install_aspace(&proc);
        proc
    }

    fn install_aspace(&self, proc: &Process) {
        let aspace = self
            .mem
            .create()
            .unwrap_or_else(|e| panic!("create aspace: {e}"));
        proc.set_addrspace(aspace);
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        self.vfs.add(path, CountingVnode::with_data(data));
    }

    pub fn add_console(&self, path: &str) {
        self.vfs.add(path, CountingVnode::console());
    }

    pub fn vnode_closed(&self, path: &str) -> usize {
        self.vfs
            .vnode(path)
            .map_or(0, |v| v.closed())
    }

    /// Open `path` (creating it with placeholder data if absent) and
    /// bind it to the process's lowest free descriptor.
    pub fn open_for(&self, proc: &Process, path: &str, access: AccessMode) -> OpenFileId {
        if self.vfs.vnode(path).is_none() {
            self.add_file(path, b"data");
        }
        let id = self.register_raw(path, access);
        let mut fds = proc.fd_table.lock();
        let fd = fds.alloc().unwrap_or_else(|| panic!("fd table full"));
        fds.bind(fd, id);
        id
    }

    /// Enter `path` into the registry without binding a descriptor.
    pub fn register_raw(&self, path: &str, access: AccessMode) -> OpenFileId {
        let vnode = self
            .vfs
            .vnode(path)
            .unwrap_or_else(|| panic!("no vnode at {path}"));
        self.kernel
            .open_files()
            .register(vnode, access)
            .unwrap_or_else(|e| panic!("register: {e}"))
    }

    pub fn poke(&self, proc: &Process, addr: usize, bytes: &[u8]) {
        let aspace = proc.addrspace();
        self.mem
            .copy_out(aspace.as_ref(), bytes, addr)
            .unwrap_or_else(|e| panic!("poke: {e}"));
    }

    /// Write a NUL-terminated string and return its address.
    pub fn poke_str(&self, proc: &Process, addr: usize, s: &str) -> usize {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.poke(proc, addr, &bytes);
        addr
    }

    /// Write a NULL-terminated pointer array and return its address.
    pub fn poke_argv(&self, proc: &Process, addr: usize, ptrs: &[usize]) -> usize {
        let mut bytes = Vec::new();
        for p in ptrs {
            bytes.extend_from_slice(&p.to_ne_bytes());
        }
        bytes.extend_from_slice(&0usize.to_ne_bytes());
        self.poke(proc, addr, &bytes);
        addr
    }

    pub fn peek(&self, proc: &Process, addr: usize, len: usize) -> Vec<u8> {
        let aspace = proc.addrspace();
        let mut buf = alloc::vec![0u8; len];
        self.mem
            .copy_in(aspace.as_ref(), addr, &mut buf)
            .unwrap_or_else(|e| panic!("peek: {e}"));
        buf
    }
}
