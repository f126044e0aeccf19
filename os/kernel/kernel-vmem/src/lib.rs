//! # Virtual Memory Support
//!
//! Sv39 paging for the kernel: page-table entries, the three-level walker,
//! per-process address-space lifecycle and the user/kernel copy routines.
//!
//! ## Sv39 Virtual Address → Physical Address Walk
//!
//! Only the low 39 bits of a virtual address take part in translation:
//!
//! ```text
//! | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |   L2  |   L1  |   L0  | Offset |
//! ```
//!
//! Each level is one 4 KiB table of 512 eight-byte entries. The walk starts
//! at the root (the frame named by `satp`) and descends until it reaches an
//! L0 entry:
//!
//! ```text
//!  satp → L2 table → L1 table → L0 table → 4 KiB frame
//! ```
//!
//! An entry with none of `R`/`W`/`X` set points to the next table. An L0
//! entry with any of them set maps one frame. This kernel never maps
//! megapages or gigapages, so a leaf above L0 is treated as corruption.
//!
//! The kernel additionally uses the software bit 8 ([`PageEntryBits::lazy`])
//! to mark a user page that is *reserved* for a file mapping but not yet
//! backed by a frame. Such an entry is valid but carries no permissions, so
//! any access traps and the fault handler can populate it.
//!
//! Addresses at or above [`info::MAX_VA`] (`1 << 38`) are never translated;
//! the top page is reserved for the trampoline.
//!
//! ## Collaborators
//!
//! - [`FrameAlloc`] hands out and takes back 4 KiB physical frames.
//! - [`PhysMapper`] turns a physical address into a kernel-usable reference.
//!   On the target this is the identity map; tests use an offset map over a
//!   heap buffer.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

pub mod address_space;
mod copy;
pub mod kernel_space;
mod lifecycle;
mod page_entry;
mod page_table;

pub use crate::address_space::{AddressSpace, MapError, ReserveError, WalkError};
pub use crate::copy::CopyError;
pub use crate::lifecycle::{AddressSpaceError, DuplicateError, GrowError};
pub use crate::page_entry::{EntryKind, LeafPermissions, PageEntry, PageEntryBits};
pub use crate::page_table::{PageLevel, PageTable, TableIndex};
pub use kernel_memory_addresses::*;

/// Re-export constants as info module.
pub use kernel_info::memory as info;

/// Source of 4 KiB physical frames.
///
/// Frames are page aligned and uniquely owned by whoever allocated them until
/// they are passed back to [`free_4k`](Self::free_4k). Their contents are
/// unspecified; callers zero them when needed.
pub trait FrameAlloc {
    /// Allocate one 4 KiB frame, or `None` if memory is exhausted.
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;

    /// Return a frame previously obtained from [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, page: PhysicalPage<Size4K>);
}

impl<A: FrameAlloc + ?Sized> FrameAlloc for &mut A {
    #[inline]
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        (**self).alloc_4k()
    }

    #[inline]
    fn free_4k(&mut self, page: PhysicalPage<Size4K>) {
        (**self).free_4k(page);
    }
}

/// Converts physical addresses to *temporarily* usable references in the
/// current virtual address space (identity map, direct map, ...).
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// - `pa` must lie in memory the mapper covers and be aligned for `T`.
    /// - The bytes at `pa` must be a valid `T`.
    /// - The caller must not create overlapping references to the same
    ///   memory while the returned one is live.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// Typed views over frames, built on [`PhysMapper::phys_to_mut`].
pub trait PhysMapperExt: PhysMapper {
    /// Borrow a page-table frame as a [`PageTable`].
    #[inline]
    fn table_mut(&self, page: PhysicalPage<Size4K>) -> &mut PageTable {
        // SAFETY: page-table frames are 4 KiB aligned and every bit pattern
        // is a valid table; walks hold at most one table reference per level.
        unsafe { self.phys_to_mut::<PageTable>(page.base()) }
    }

    /// Borrow a data frame as raw bytes.
    #[inline]
    fn frame_mut(&self, page: PhysicalPage<Size4K>) -> &mut [u8; 4096] {
        // SAFETY: any 4 KiB frame is a valid byte array.
        unsafe { self.phys_to_mut::<[u8; 4096]>(page.base()) }
    }

    /// Fill a frame with zeros.
    #[inline]
    fn zero_frame(&self, page: PhysicalPage<Size4K>) {
        self.frame_mut(page).fill(0);
    }
}

impl<T: PhysMapper + ?Sized> PhysMapperExt for T {}
