//! Per-process user memory: one address space, its size watermark and the
//! regions mapped into it.

use crate::{MunmapError, RegionTable};
use kernel_info::memory::TRAPFRAME;
use kernel_info::param::MAX_MAPPED_REGIONS;
use kernel_vmem::{
    AddressSpace, AddressSpaceError, DuplicateError, EntryKind, FrameAlloc, GrowError,
    PageLevel, PhysMapper, ReserveError, Size4K, VirtualPage,
};
use log::{debug, warn};

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum ForkError {
    #[error("fork: {0}")]
    Create(#[from] AddressSpaceError),
    #[error("fork: {0}")]
    Copy(#[from] DuplicateError),
    #[error("fork: {0}")]
    Reserve(#[from] ReserveError),
}

/// User half of a process.
///
/// User memory occupies `[0, size)`. Heap growth and mappings both extend
/// `size`; mappings are placed at the page-rounded watermark.
pub struct UserMemory<'m, M: PhysMapper> {
    pub(crate) space: AddressSpace<'m, M>,
    pub(crate) size: u64,
    pub(crate) regions: RegionTable,
}

impl<'m, M: PhysMapper> UserMemory<'m, M> {
    /// Empty user memory in a fresh address space.
    ///
    /// # Errors
    /// [`AddressSpaceError::OutOfMemory`] if the root table cannot be allocated.
    pub fn create<A: FrameAlloc>(mapper: &'m M, alloc: &mut A) -> Result<Self, AddressSpaceError> {
        Ok(Self::new(AddressSpace::create(mapper, alloc)?, 0))
    }

    /// Wrap an already populated address space of `size` bytes.
    #[must_use]
    pub const fn new(space: AddressSpace<'m, M>, size: u64) -> Self {
        Self {
            space,
            size,
            regions: RegionTable::new(),
        }
    }

    #[must_use]
    pub const fn space(&self) -> &AddressSpace<'m, M> {
        &self.space
    }

    /// The watermark.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub const fn regions(&self) -> &RegionTable {
        &self.regions
    }

    /// Highest end address of any live region, or 0.
    fn regions_end(&self) -> u64 {
        self.regions
            .iter()
            .map(|(_, r)| r.end().as_u64())
            .max()
            .unwrap_or(0)
    }

    /// Grow the heap by `n` bytes of zeroed memory. Returns the old size.
    ///
    /// # Errors
    /// [`GrowError::OutOfMemory`] if frames run out or the heap would reach
    /// the trap frame; the watermark is left unchanged.
    pub fn grow<A: FrameAlloc>(&mut self, alloc: &mut A, n: u64) -> Result<u64, GrowError> {
        let old = self.size;
        let new = old
            .checked_add(n)
            .filter(|&new| new <= TRAPFRAME)
            .ok_or(GrowError::OutOfMemory(old.saturating_add(n)))?;
        self.size = self.space.grow_to(alloc, old, new)?;
        Ok(old)
    }

    /// Shrink the heap by up to `n` bytes. Returns the old size.
    ///
    /// The watermark never drops below the end of a live region.
    pub fn shrink<A: FrameAlloc>(&mut self, alloc: &mut A, n: u64) -> u64 {
        let old = self.size;
        let wanted = old.saturating_sub(n);
        let floor = self.regions_end();
        if wanted < floor {
            warn!("shrink: clamped to {floor:#x}, a region ends there");
        }
        self.size = self.space.shrink_to(alloc, old, wanted.max(floor));
        old
    }

    /// Copy this process's memory into a new one.
    ///
    /// Backed pages are copied; pages a region reserved but never faulted are
    /// reserved again in the child. Every region is duplicated with its own
    /// file reference, so a shared mapping's faulted pages become private
    /// copies in the child.
    ///
    /// # Errors
    /// A [`ForkError`] if memory runs out. Everything allocated for the child
    /// is released again first.
    pub fn fork<A: FrameAlloc>(&self, alloc: &mut A) -> Result<Self, ForkError> {
        let child = AddressSpace::create(self.space.mapper(), alloc)?;
        if let Err(e) = self.space.duplicate_into(&child, alloc, self.size) {
            child.free_tables(alloc);
            return Err(e.into());
        }

        for (_, region) in self.regions.iter() {
            let first = VirtualPage::<Size4K>::containing_address(region.base());
            let end = VirtualPage::<Size4K>::containing_address(region.end());
            for page in VirtualPage::range(first, end) {
                let unbacked = self
                    .space
                    .entry(page.base())
                    .is_some_and(|e| e.kind(PageLevel::L0) == EntryKind::Reserved);
                if !unbacked {
                    continue;
                }
                if let Err(e) = child.reserve(alloc, page.base(), 1) {
                    child.destroy(alloc, self.size);
                    return Err(e.into());
                }
            }
        }

        debug!(
            "fork: {} -> {} ({:#x} bytes, {} regions)",
            self.space.root_page(),
            child.root_page(),
            self.size,
            self.regions.len()
        );
        Ok(Self {
            space: child,
            size: self.size,
            regions: self.regions.duplicate(),
        })
    }

    /// Unmap every region (writing shared ones back), then free the address
    /// space.
    ///
    /// # Errors
    /// The first writeback failure. Memory is released either way.
    pub fn release<A: FrameAlloc>(mut self, alloc: &mut A) -> Result<(), MunmapError> {
        let mut result = Ok(());
        for slot in 0..MAX_MAPPED_REGIONS {
            let Some((base, length)) = self.regions.get(slot).map(|r| (r.base(), r.length())) else {
                continue;
            };
            let r = self.munmap(alloc, base, length);
            if result.is_ok() {
                result = r;
            }
        }
        self.space.destroy(alloc, self.size);
        result
    }
}
