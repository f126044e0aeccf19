//! # Address Space (Sv39, three-level)
//!
//! Strongly-typed helpers to build and manipulate a **single** virtual address
//! space (tree rooted at one L2 table).
//!
//! ## Highlights
//!
//! - [`AddressSpace::walk`] / [`AddressSpace::walk_alloc`] to find the L0 slot
//!   for an address, optionally creating missing intermediate tables.
//! - [`AddressSpace::map_pages`] / [`AddressSpace::unmap`] to install and
//!   remove runs of 4 KiB leaves.
//! - [`AddressSpace::reserve`] / [`AddressSpace::populate`] for demand-paged
//!   slots.
//! - [`AddressSpace::translate`] for user translations.
//! - [`AddressSpace::activate`] to load `satp` with this space's root.
//!
//! Lifecycle operations (create, grow, shrink, duplicate, destroy) live in
//! the `lifecycle` module; byte copies live in `copy`.
//!
//! ## Safety
//!
//! - Mutating active mappings requires `sfence.vma` afterwards.
//! - The provided `PhysMapper` must yield **writable** references to table frames.

use crate::page_table::{PageLevel, PageTable, TableIndex};
use crate::{EntryKind, FrameAlloc, LeafPermissions, PageEntry, PhysMapper, PhysMapperExt};
use kernel_info::memory::{MAX_VA, PAGE_SIZE, PAGE_TABLE_ENTRIES, SATP_SV39};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress, VirtualPage};

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalPage<Size4K>, // L2 frame
    pub(crate) mapper: &'m M,
}

/// The root (L2) page for an [`AddressSpace`].
pub type RootPage = PhysicalPage<Size4K>;

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum WalkError {
    #[error("out of memory while allocating a page table")]
    OutOfMemory,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("out of memory while allocating a page table for {0}")]
    OutOfMemory(VirtualAddress),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum ReserveError {
    #[error("out of memory while reserving {0}")]
    OutOfMemory(VirtualAddress),
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Wrap an existing root frame.
    #[inline]
    pub const fn from_root(mapper: &'m M, root: PhysicalPage<Size4K>) -> Self {
        Self { root, mapper }
    }

    /// Physical page of the root table.
    #[inline]
    pub const fn root_page(&self) -> RootPage {
        self.root
    }

    /// The mapper this space reaches its frames through.
    #[inline]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    /// The `satp` value selecting this space in Sv39 mode.
    #[inline]
    #[must_use]
    pub const fn satp(&self) -> u64 {
        SATP_SV39 | self.root.number()
    }

    /// Load `satp` with this address space's root and flush the TLB.
    ///
    /// # Safety
    /// The currently executing code, its stack and the trap vectors must be
    /// mapped identically in the target space.
    #[cfg(target_arch = "riscv64")]
    #[inline]
    pub unsafe fn activate(&self) {
        let satp = self.satp();
        unsafe {
            core::arch::asm!(
                "sfence.vma zero, zero",
                "csrw satp, {0}",
                "sfence.vma zero, zero",
                in(reg) satp,
                options(nostack, preserves_flags)
            );
        }
    }

    #[inline]
    pub(crate) fn table_mut(&self, page: PhysicalPage<Size4K>) -> &mut PageTable {
        self.mapper.table_mut(page)
    }

    /// Find the L0 slot for `va` without allocating.
    ///
    /// Returns `None` when an intermediate table is missing.
    ///
    /// # Panics
    /// If `va >= MAX_VA`, or if an upper-level entry is not a table pointer.
    pub fn walk(&self, va: VirtualAddress) -> Option<&mut PageEntry> {
        self.walk_inner(va, None::<&mut NoAlloc>).ok().flatten()
    }

    /// Find the L0 slot for `va`, creating zeroed intermediate tables as
    /// needed.
    ///
    /// # Errors
    /// [`WalkError::OutOfMemory`] if a table frame cannot be allocated. Tables
    /// created before the failure stay linked; they are reclaimed when the
    /// space is destroyed.
    ///
    /// # Panics
    /// If `va >= MAX_VA`, or if an upper-level entry is not a table pointer.
    pub fn walk_alloc<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
    ) -> Result<&mut PageEntry, WalkError> {
        match self.walk_inner(va, Some(alloc))? {
            Some(slot) => Ok(slot),
            None => unreachable!("allocating walk always reaches the leaf"),
        }
    }

    fn walk_inner<A: FrameAlloc>(
        &self,
        va: VirtualAddress,
        mut alloc: Option<&mut A>,
    ) -> Result<Option<&mut PageEntry>, WalkError> {
        assert!(va.as_u64() < MAX_VA, "walk: {va} beyond MAX_VA");

        let mut table = self.table_mut(self.root);
        let mut level = PageLevel::ROOT;
        while let Some(below) = level.below() {
            let slot = table.slot_mut(TableIndex::of(va, level));
            let next = match slot.kind(level) {
                EntryKind::Table(next) => next,
                EntryKind::Invalid => {
                    let Some(alloc) = alloc.as_deref_mut() else {
                        return Ok(None);
                    };
                    let page = alloc.alloc_4k().ok_or(WalkError::OutOfMemory)?;
                    self.mapper.zero_frame(page);
                    *slot = PageEntry::table(page);
                    page
                }
                other => panic!("walk: {other:?} at {level:?} for {va}"),
            };
            table = self.table_mut(next);
            level = below;
        }
        Ok(Some(table.slot_mut(TableIndex::of(va, PageLevel::L0))))
    }

    /// Copy of the L0 entry for `va`, or `None` if no L0 table covers it.
    #[must_use]
    pub fn entry(&self, va: VirtualAddress) -> Option<PageEntry> {
        self.walk(va).map(|slot| *slot)
    }

    /// Install leaves for every page of `[va, va + size)`, mapping them to
    /// consecutive frames starting at `pa`.
    ///
    /// `va` and `size` need not be page aligned; every page touched by the
    /// range is mapped.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if a table frame cannot be allocated. Leaves
    /// installed before the failure are left in place.
    ///
    /// # Panics
    /// If `size == 0`, or if any target slot is already valid (remap).
    pub fn map_pages<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        size: u64,
        pa: PhysicalAddress,
        perms: LeafPermissions,
    ) -> Result<(), MapError> {
        assert!(size != 0, "map_pages: size 0");
        debug_assert!(pa.is_aligned::<Size4K>(), "map_pages: {pa} not page aligned");

        let first = va.page_round_down();
        let last = (va + (size - 1)).page_round_down();
        let mut frame = pa.page::<Size4K>();
        let mut page = VirtualPage::<Size4K>::containing_address(first);
        loop {
            let a = page.base();
            let slot = self
                .walk_alloc(alloc, a)
                .map_err(|_| MapError::OutOfMemory(a))?;
            assert!(!slot.is_valid(), "map_pages: remap of {a}");
            *slot = PageEntry::leaf(frame, perms);
            if a == last {
                return Ok(());
            }
            page = page.add_pages(1);
            frame = frame.add_pages(1);
        }
    }

    /// Remove `page_count` leaves starting at `va`, releasing their frames
    /// when `free` is set.
    ///
    /// Missing tables and invalid slots are skipped, so unmapping a partially
    /// mapped range is fine. Reserved slots are cleared without touching the
    /// allocator.
    ///
    /// # Panics
    /// If `va` is not page aligned or a slot holds something other than a leaf.
    pub fn unmap<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        page_count: u64,
        free: bool,
    ) {
        assert!(va.is_page_aligned(), "unmap: {va} not aligned");

        let start = VirtualPage::<Size4K>::containing_address(va);
        for page in VirtualPage::range(start, start.add_pages(page_count)) {
            let Some(slot) = self.walk(page.base()) else {
                continue;
            };
            match slot.kind(PageLevel::L0) {
                EntryKind::Invalid => continue,
                EntryKind::Leaf(frame, _) => {
                    if free {
                        alloc.free_4k(frame);
                    }
                }
                EntryKind::Reserved => {}
                EntryKind::Table(_) => unreachable!("kind never yields a table at L0"),
            }
            *slot = PageEntry::zero();
        }
    }

    /// Mark `page_count` pages from `va` as reserved-but-unbacked user slots.
    ///
    /// # Errors
    /// [`ReserveError::OutOfMemory`] if a table frame cannot be allocated;
    /// every slot reserved by this call is cleared again first.
    ///
    /// # Panics
    /// If `va` is not page aligned or a target slot is already valid.
    pub fn reserve<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        page_count: u64,
    ) -> Result<(), ReserveError> {
        assert!(va.is_page_aligned(), "reserve: {va} not aligned");

        let start = VirtualPage::<Size4K>::containing_address(va);
        for (done, page) in VirtualPage::range(start, start.add_pages(page_count)).enumerate() {
            let a = page.base();
            let Ok(slot) = self.walk_alloc(alloc, a) else {
                self.unmap(alloc, va, done as u64, false);
                return Err(ReserveError::OutOfMemory(a));
            };
            assert!(!slot.is_valid(), "reserve: remap of {a}");
            *slot = PageEntry::reserved();
        }
        Ok(())
    }

    /// Back the reserved slot at `va` with `frame`.
    ///
    /// # Panics
    /// If the slot for `va` is not reserved.
    pub fn populate(&self, va: VirtualAddress, frame: PhysicalPage<Size4K>, perms: LeafPermissions) {
        let slot = self
            .walk(va)
            .filter(|slot| slot.kind(PageLevel::L0) == EntryKind::Reserved)
            .unwrap_or_else(|| panic!("populate: {va} is not reserved"));
        *slot = PageEntry::leaf(frame, perms.with_user(true));
    }

    /// Free every table of this space, bottom-up.
    ///
    /// # Panics
    /// If any leaf (backed or reserved) is still present.
    #[allow(clippy::needless_pass_by_value)]
    pub fn free_tables<A: FrameAlloc>(self, alloc: &mut A) {
        self.free_table(alloc, self.root, PageLevel::ROOT);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn free_table<A: FrameAlloc>(&self, alloc: &mut A, page: PhysicalPage<Size4K>, level: PageLevel) {
        for i in (0..PAGE_TABLE_ENTRIES).map(|i| TableIndex::new(i as u16)) {
            let entry = self.table_mut(page).get(i);
            match entry.kind(level) {
                EntryKind::Invalid => {}
                EntryKind::Table(next) => {
                    let below = level.below().unwrap_or_else(|| unreachable!());
                    self.free_table(alloc, next, below);
                    self.table_mut(page).set(i, PageEntry::zero());
                }
                EntryKind::Leaf(..) | EntryKind::Reserved => {
                    panic!("free_tables: leaf {entry:?} still mapped at {level:?}")
                }
            }
        }
        alloc.free_4k(page);
    }

    /// Translate a user address to its physical address.
    ///
    /// Only valid, user-accessible, backed leaves translate. Addresses at or
    /// beyond `MAX_VA` yield `None`.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        if va.as_u64() >= MAX_VA {
            return None;
        }
        match self.entry(va)?.kind(PageLevel::L0) {
            EntryKind::Leaf(frame, perms) if perms.user() => Some(frame.join(va.offset())),
            _ => None,
        }
    }

    /// Map a range into a kernel table. Failure is fatal.
    ///
    /// # Panics
    /// If table frames run out, or on any [`map_pages`](Self::map_pages) panic.
    pub fn map_kernel<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        size: u64,
        perms: LeafPermissions,
    ) {
        if let Err(e) = self.map_pages(alloc, va, size, pa, perms) {
            panic!("map_kernel: {e}");
        }
    }

    /// Revoke user access to the page at `va` (stack guard page).
    ///
    /// # Panics
    /// If no slot exists for `va`.
    pub fn clear_user(&self, va: VirtualAddress) {
        let Some(slot) = self.walk(va) else {
            panic!("clear_user: no mapping for {va}");
        };
        slot.clear_user();
    }
}

/// Number of pages needed to cover `bytes`.
#[inline]
pub(crate) const fn pages_for(bytes: u64) -> u64 {
    bytes.div_ceil(PAGE_SIZE)
}

/// Allocator type used by non-allocating walks; never called.
enum NoAlloc {}

impl FrameAlloc for NoAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        match *self {}
    }

    fn free_4k(&mut self, _page: PhysicalPage<Size4K>) {
        match *self {}
    }
}
