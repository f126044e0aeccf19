//! Per-process address-space lifecycle: create, grow, shrink, duplicate,
//! destroy.
//!
//! Sizes are byte watermarks: user memory occupies `[0, size)`. Pages between
//! the page-rounded old and new sizes are what grow and shrink touch.

use crate::address_space::pages_for;
use crate::{
    AddressSpace, EntryKind, FrameAlloc, LeafPermissions, PageLevel, PhysMapper, PhysMapperExt,
};
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{Size4K, VirtualAddress, VirtualPage, page_round_up};
use log::debug;

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum AddressSpaceError {
    #[error("out of memory while allocating a root page table")]
    OutOfMemory,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum GrowError {
    #[error("out of memory while growing to {0:#x}")]
    OutOfMemory(u64),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum DuplicateError {
    #[error("out of memory while duplicating {0}")]
    OutOfMemory(VirtualAddress),
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// A fresh, empty address space.
    ///
    /// # Errors
    /// [`AddressSpaceError::OutOfMemory`] if the root frame cannot be allocated.
    pub fn create<A: FrameAlloc>(mapper: &'m M, alloc: &mut A) -> Result<Self, AddressSpaceError> {
        let root = alloc.alloc_4k().ok_or(AddressSpaceError::OutOfMemory)?;
        mapper.zero_frame(root);
        Ok(Self::from_root(mapper, root))
    }

    /// Back `[round_up(old), new)` with zeroed user R/W/X frames.
    ///
    /// Returns the new watermark; `new < old` leaves the space untouched and
    /// returns `old`.
    ///
    /// # Errors
    /// [`GrowError::OutOfMemory`] if a frame or table cannot be allocated.
    /// Everything mapped by this call is released again first.
    pub fn grow_to<A: FrameAlloc>(&self, alloc: &mut A, old: u64, new: u64) -> Result<u64, GrowError> {
        if new < old {
            return Ok(old);
        }

        let mut a = page_round_up(old);
        while a < new {
            let Some(frame) = alloc.alloc_4k() else {
                self.shrink_to(alloc, a, old);
                return Err(GrowError::OutOfMemory(new));
            };
            self.mapper.zero_frame(frame);
            let va = VirtualAddress::new(a);
            if self
                .map_pages(alloc, va, PAGE_SIZE, frame.base(), LeafPermissions::user_rwx())
                .is_err()
            {
                alloc.free_4k(frame);
                self.shrink_to(alloc, a, old);
                return Err(GrowError::OutOfMemory(new));
            }
            a += PAGE_SIZE;
        }
        debug!("address space {}: grew {old:#x} -> {new:#x}", self.root_page());
        Ok(new)
    }

    /// Release the pages in `[round_up(new), round_up(old))`.
    ///
    /// Returns the new watermark; `new >= old` is a no-op returning `old`.
    pub fn shrink_to<A: FrameAlloc>(&self, alloc: &mut A, old: u64, new: u64) -> u64 {
        if new >= old {
            return old;
        }

        let (low, high) = (page_round_up(new), page_round_up(old));
        if low < high {
            self.unmap(alloc, VirtualAddress::new(low), (high - low) / PAGE_SIZE, true);
        }
        new
    }

    /// Copy every backed page below `size` into `child`, frame by frame.
    ///
    /// Each copy gets a fresh frame and the parent's permissions. Reserved and
    /// invalid slots, and ranges with no tables, are skipped.
    ///
    /// # Errors
    /// [`DuplicateError::OutOfMemory`] if a frame or table cannot be
    /// allocated. Every page copied into `child` is released again first.
    pub fn duplicate_into<A: FrameAlloc>(
        &self,
        child: &AddressSpace<'_, M>,
        alloc: &mut A,
        size: u64,
    ) -> Result<(), DuplicateError> {
        let end = VirtualPage::<Size4K>::containing_address(VirtualAddress::new(page_round_up(size)));
        let start = VirtualPage::<Size4K>::containing_address(VirtualAddress::zero());
        for (done, page) in VirtualPage::range(start, end).enumerate() {
            let va = page.base();
            let Some(entry) = self.entry(va) else {
                continue;
            };
            let EntryKind::Leaf(src, perms) = entry.kind(PageLevel::L0) else {
                continue;
            };

            let Some(dst) = alloc.alloc_4k() else {
                child.unmap(alloc, VirtualAddress::zero(), done as u64, true);
                return Err(DuplicateError::OutOfMemory(va));
            };
            child.mapper.frame_mut(dst).copy_from_slice(self.mapper.frame_mut(src));
            if child.map_pages(alloc, va, PAGE_SIZE, dst.base(), perms).is_err() {
                alloc.free_4k(dst);
                child.unmap(alloc, VirtualAddress::zero(), done as u64, true);
                return Err(DuplicateError::OutOfMemory(va));
            }
        }
        debug!(
            "address space {}: duplicated {size:#x} bytes into {}",
            self.root_page(),
            child.root_page()
        );
        Ok(())
    }

    /// Release every page below `size`, then all tables.
    pub fn destroy<A: FrameAlloc>(self, alloc: &mut A, size: u64) {
        if size > 0 {
            self.unmap(alloc, VirtualAddress::zero(), pages_for(size), true);
        }
        debug!("address space {}: destroyed", self.root_page());
        self.free_tables(alloc);
    }

    /// Map one zeroed user R/W/X page at address 0 holding `code`.
    ///
    /// # Errors
    /// [`GrowError::OutOfMemory`] if the page or its tables cannot be
    /// allocated.
    ///
    /// # Panics
    /// If `code` does not fit in one page.
    pub fn load_init_code<A: FrameAlloc>(&self, alloc: &mut A, code: &[u8]) -> Result<(), GrowError> {
        assert!((code.len() as u64) < PAGE_SIZE, "load_init_code: more than a page");
        self.grow_to(alloc, 0, PAGE_SIZE)?;
        let Some(frame) = self.translate(VirtualAddress::zero()) else {
            unreachable!("page 0 was just mapped");
        };
        self.mapper.frame_mut(frame.page())[..code.len()].copy_from_slice(code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestPhys;
    use crate::PhysicalAddress;

    fn read_byte(space: &AddressSpace<'_, TestPhys>, phys: &TestPhys, va: u64) -> u8 {
        let pa: PhysicalAddress = space.translate(VirtualAddress::new(va)).unwrap();
        phys.frame_mut(pa.page())[pa.offset::<kernel_memory_addresses::Size4K>().as_usize()]
    }

    #[test]
    fn grow_maps_zeroed_user_pages() {
        let phys = TestPhys::with_frames(32);
        let mut alloc = phys.alloc();
        let space = AddressSpace::create(&phys, &mut alloc).unwrap();

        assert_eq!(space.grow_to(&mut alloc, 0, 3 * PAGE_SIZE - 10).unwrap(), 3 * PAGE_SIZE - 10);
        for page in 0..3 {
            let va = page * PAGE_SIZE;
            assert_eq!(read_byte(&space, &phys, va), 0);
            let entry = space.entry(VirtualAddress::new(va)).unwrap();
            let EntryKind::Leaf(_, perms) = entry.kind(PageLevel::L0) else {
                panic!("expected leaf");
            };
            assert_eq!(perms, LeafPermissions::user_rwx());
        }
        assert!(space.translate(VirtualAddress::new(3 * PAGE_SIZE)).is_none());
    }

    #[test]
    fn grow_below_old_is_noop() {
        let phys = TestPhys::with_frames(8);
        let mut alloc = phys.alloc();
        let space = AddressSpace::create(&phys, &mut alloc).unwrap();
        assert_eq!(space.grow_to(&mut alloc, 0x5000, 0x1000).unwrap(), 0x5000);
        assert_eq!(phys.in_use(), 1);
    }

    #[test]
    fn grow_then_shrink_restores_frame_count() {
        let phys = TestPhys::with_frames(32);
        let mut alloc = phys.alloc();
        let space = AddressSpace::create(&phys, &mut alloc).unwrap();
        space.grow_to(&mut alloc, 0, PAGE_SIZE).unwrap();
        let before = phys.in_use();

        let grown = space.grow_to(&mut alloc, PAGE_SIZE, 6 * PAGE_SIZE).unwrap();
        assert_eq!(phys.in_use(), before + 5);
        assert_eq!(space.shrink_to(&mut alloc, grown, PAGE_SIZE), PAGE_SIZE);
        assert_eq!(phys.in_use(), before);
        assert!(space.translate(VirtualAddress::new(PAGE_SIZE)).is_none());
        assert!(space.translate(VirtualAddress::zero()).is_some());
    }

    #[test]
    fn shrink_within_a_page_keeps_it() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = phys.alloc();
        let space = AddressSpace::create(&phys, &mut alloc).unwrap();
        space.grow_to(&mut alloc, 0, 2 * PAGE_SIZE).unwrap();
        assert_eq!(space.shrink_to(&mut alloc, 2 * PAGE_SIZE, PAGE_SIZE + 1), PAGE_SIZE + 1);
        assert!(space.translate(VirtualAddress::new(PAGE_SIZE)).is_some());
        assert_eq!(space.shrink_to(&mut alloc, PAGE_SIZE, 2 * PAGE_SIZE), PAGE_SIZE);
    }

    #[test]
    fn failed_grow_unwinds_to_old_size() {
        let phys = TestPhys::with_frames(32);
        let mut alloc = phys.alloc_limited(6);
        let space = AddressSpace::create(&phys, &mut alloc).unwrap();
        space.grow_to(&mut alloc, 0, PAGE_SIZE).unwrap();
        let before = phys.in_use();

        let err = space.grow_to(&mut alloc, PAGE_SIZE, 10 * PAGE_SIZE).unwrap_err();
        assert_eq!(err, GrowError::OutOfMemory(10 * PAGE_SIZE));
        assert_eq!(phys.in_use(), before);
        assert!(space.translate(VirtualAddress::new(PAGE_SIZE)).is_none());
    }

    #[test]
    fn duplicate_copies_contents_into_distinct_frames() {
        let phys = TestPhys::with_frames(32);
        let mut alloc = phys.alloc();
        let parent = AddressSpace::create(&phys, &mut alloc).unwrap();
        parent.grow_to(&mut alloc, 0, 2 * PAGE_SIZE).unwrap();
        parent.copy_out(VirtualAddress::new(0x10), b"parent").unwrap();

        let child = AddressSpace::create(&phys, &mut alloc).unwrap();
        parent.duplicate_into(&child, &mut alloc, 2 * PAGE_SIZE).unwrap();

        let mut buf = [0u8; 6];
        child.copy_in(&mut buf, VirtualAddress::new(0x10)).unwrap();
        assert_eq!(&buf, b"parent");

        child.copy_out(VirtualAddress::new(0x10), b"child!").unwrap();
        parent.copy_in(&mut buf, VirtualAddress::new(0x10)).unwrap();
        assert_eq!(&buf, b"parent");
        assert_ne!(
            parent.translate(VirtualAddress::zero()),
            child.translate(VirtualAddress::zero())
        );
    }

    #[test]
    fn duplicate_skips_reserved_slots() {
        let phys = TestPhys::with_frames(32);
        let mut alloc = phys.alloc();
        let parent = AddressSpace::create(&phys, &mut alloc).unwrap();
        parent.grow_to(&mut alloc, 0, PAGE_SIZE).unwrap();
        parent.reserve(&mut alloc, VirtualAddress::new(PAGE_SIZE), 2).unwrap();

        let child = AddressSpace::create(&phys, &mut alloc).unwrap();
        parent.duplicate_into(&child, &mut alloc, 3 * PAGE_SIZE).unwrap();
        assert!(child.translate(VirtualAddress::zero()).is_some());
        assert!(
            child
                .entry(VirtualAddress::new(PAGE_SIZE))
                .is_none_or(|e| e.kind(PageLevel::L0) == EntryKind::Invalid)
        );
    }

    #[test]
    fn failed_duplicate_releases_partial_copy() {
        let phys = TestPhys::with_frames(32);
        let mut alloc = phys.alloc();
        let parent = AddressSpace::create(&phys, &mut alloc).unwrap();
        parent.grow_to(&mut alloc, 0, 4 * PAGE_SIZE).unwrap();
        let child = AddressSpace::create(&phys, &mut alloc).unwrap();
        let before = phys.in_use();

        // child tables (2) + two copied pages, then exhaustion
        let mut limited = phys.alloc_limited(before + 4);
        let err = parent.duplicate_into(&child, &mut limited, 4 * PAGE_SIZE).unwrap_err();
        assert_eq!(err, DuplicateError::OutOfMemory(VirtualAddress::new(2 * PAGE_SIZE)));
        // the child's intermediate tables stay until it is destroyed
        assert_eq!(phys.in_use(), before + 2);
        assert!(child.translate(VirtualAddress::zero()).is_none());
        child.destroy(&mut alloc, 0);
        assert_eq!(phys.in_use(), before - 1);
    }

    #[test]
    fn destroy_releases_everything() {
        let phys = TestPhys::with_frames(32);
        let mut alloc = phys.alloc();
        let space = AddressSpace::create(&phys, &mut alloc).unwrap();
        let size = space.grow_to(&mut alloc, 0, 5 * PAGE_SIZE + 7).unwrap();
        space.reserve(&mut alloc, VirtualAddress::new(6 * PAGE_SIZE), 1).unwrap();
        assert!(size < 7 * PAGE_SIZE);
        space.destroy(&mut alloc, 7 * PAGE_SIZE);
        assert_eq!(phys.in_use(), 0);
    }

    #[test]
    fn init_code_lands_at_zero() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = phys.alloc();
        let space = AddressSpace::create(&phys, &mut alloc).unwrap();
        space.load_init_code(&mut alloc, &[0x13, 0x05, 0x00, 0x00]).unwrap();
        assert_eq!(read_byte(&space, &phys, 0), 0x13);
        assert_eq!(read_byte(&space, &phys, 4), 0);
    }

    #[test]
    #[should_panic(expected = "more than a page")]
    fn init_code_must_fit_a_page() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = phys.alloc();
        let space = AddressSpace::create(&phys, &mut alloc).unwrap();
        let _ = space.load_init_code(&mut alloc, &[0; 4096]);
    }
}
