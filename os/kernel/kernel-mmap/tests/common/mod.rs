//! Host-side "machine" for the mapping tests: a heap buffer standing in for
//! physical RAM, a bitmap frame allocator over it and an in-memory inode.

#![allow(dead_code)]

use kernel_alloc::frame_alloc::{BitmapFrameAlloc, LockedFrameAlloc};
use kernel_alloc::phys_mapper::OffsetPhysMapper;
use kernel_mmap::{FileHandle, FsError, Inode, UserMemory};
use kernel_sync::SpinLock;
use kernel_vmem::{EntryKind, PageLevel, PhysicalAddress, Size4K, VirtualAddress};
use std::sync::Arc;

pub const RAM_BASE: u64 = 0x8000_0000;
pub const PAGE: u64 = 4096;

/// Bitmap words for up to 512 frames.
pub type Frames = LockedFrameAlloc<BitmapFrameAlloc<8>>;
pub type Memory<'m> = UserMemory<'m, OffsetPhysMapper>;

#[repr(C, align(4096))]
struct Frame([u8; 4096]);

pub struct Machine {
    _ram: Box<[Frame]>,
    pub mapper: OffsetPhysMapper,
    pub frames: Frames,
}

impl Machine {
    pub fn new() -> Self {
        Self::with_frames(256)
    }

    pub fn with_frames(n: usize) -> Self {
        let mut ram: Box<[Frame]> = (0..n).map(|_| Frame([0xA5; 4096])).collect();
        let host = ram.as_mut_ptr() as u64;
        let base = PhysicalAddress::new(RAM_BASE).page::<Size4K>();
        Self {
            _ram: ram,
            mapper: OffsetPhysMapper::new(host.wrapping_sub(RAM_BASE)),
            frames: LockedFrameAlloc::new(BitmapFrameAlloc::new(base, n)),
        }
    }

    /// Allocator handle to pass as `&mut alloc`.
    pub fn alloc(&self) -> &Frames {
        &self.frames
    }

    pub fn in_use(&self) -> usize {
        self.frames.in_use()
    }
}

/// One `write_at` call as the inode saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRecord {
    pub offset: u64,
    pub len: usize,
    pub written: usize,
    pub in_tx: bool,
}

#[derive(Default)]
struct State {
    data: Vec<u8>,
    writes: Vec<WriteRecord>,
    tx_depth: usize,
    transactions: usize,
    fail_reads: bool,
    fail_writes: bool,
    max_size: Option<usize>,
}

/// File contents held in memory.
pub struct RamInode {
    inum: u32,
    state: SpinLock<State>,
}

impl RamInode {
    pub fn new(inum: u32, data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            inum,
            state: SpinLock::named("inode", State {
                data,
                ..State::default()
            }),
        })
    }

    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().data.clone()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    pub fn transactions(&self) -> usize {
        self.state.lock().transactions
    }

    pub fn open_transactions(&self) -> usize {
        self.state.lock().tx_depth
    }

    pub fn fail_reads(&self) {
        self.state.lock().fail_reads = true;
    }

    pub fn fail_writes(&self) {
        self.state.lock().fail_writes = true;
    }

    /// Writes never grow the file past `max` bytes.
    pub fn limit_size(&self, max: usize) {
        self.state.lock().max_size = Some(max);
    }
}

impl Inode for RamInode {
    fn inum(&self) -> u32 {
        self.inum
    }

    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<usize, FsError> {
        let s = self.state.lock();
        if s.fail_reads {
            return Err(FsError::Io);
        }
        let start = usize::try_from(offset).unwrap().min(s.data.len());
        let n = dst.len().min(s.data.len() - start);
        dst[..n].copy_from_slice(&s.data[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, offset: u64, src: &[u8]) -> Result<usize, FsError> {
        let mut s = self.state.lock();
        let in_tx = s.tx_depth > 0;
        if s.fail_writes {
            s.writes.push(WriteRecord { offset, len: src.len(), written: 0, in_tx });
            return Err(FsError::Io);
        }
        let start = usize::try_from(offset).unwrap();
        let room = s.max_size.map_or(usize::MAX, |max| max.saturating_sub(start));
        let n = src.len().min(room);
        if n > 0 {
            if s.data.len() < start + n {
                s.data.resize(start + n, 0);
            }
            s.data[start..start + n].copy_from_slice(&src[..n]);
        }
        s.writes.push(WriteRecord { offset, len: src.len(), written: n, in_tx });
        Ok(n)
    }

    fn begin_op(&self) {
        let mut s = self.state.lock();
        s.tx_depth += 1;
        s.transactions += 1;
    }

    fn end_op(&self) {
        let mut s = self.state.lock();
        assert!(s.tx_depth > 0, "end_op without begin_op");
        s.tx_depth -= 1;
    }
}

pub fn open(inode: &Arc<RamInode>, readable: bool, writable: bool) -> FileHandle {
    FileHandle::open(Arc::clone(inode) as Arc<dyn Inode>, readable, writable)
}

/// `len` bytes of a recognizable, non-zero pattern.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 + 1).collect()
}

pub fn read_user(mem: &Memory<'_>, va: VirtualAddress, len: usize) -> Vec<u8> {
    let mut buf = vec![0; len];
    mem.space().copy_in(&mut buf, va).unwrap();
    buf
}

pub fn kind_at(mem: &Memory<'_>, va: VirtualAddress) -> EntryKind {
    mem.space()
        .entry(va)
        .map_or(EntryKind::Invalid, |e| e.kind(PageLevel::L0))
}
