//! # Sv39 Page Tables
//!
//! - [`PageLevel`]: which of the three levels a table lives at.
//! - [`TableIndex`]: the 9-bit slot index a virtual address selects at a level.
//! - [`PageTable`]: a 4 KiB-aligned array of 512 [`PageEntry`] slots.
//!
//! After modifying active mappings, the caller must perform any required TLB
//! maintenance (`sfence.vma`).

use crate::PageEntry;
use kernel_info::memory::{PAGE_SHIFT, PAGE_TABLE_ENTRIES, PAGE_TABLE_INDEX_BITS};
use kernel_memory_addresses::VirtualAddress;

/// Translation level. `L2` is the root, `L0` holds the 4 KiB leaves.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PageLevel {
    L0 = 0,
    L1 = 1,
    L2 = 2,
}

impl PageLevel {
    /// The level a walk starts at.
    pub const ROOT: Self = Self::L2;

    /// The next level down, or `None` at the leaf level.
    #[inline]
    #[must_use]
    pub const fn below(self) -> Option<Self> {
        match self {
            Self::L2 => Some(Self::L1),
            Self::L1 => Some(Self::L0),
            Self::L0 => None,
        }
    }

    /// Bit position of this level's index within a virtual address.
    #[inline]
    #[must_use]
    pub const fn shift(self) -> u32 {
        PAGE_SHIFT + PAGE_TABLE_INDEX_BITS * self as u32
    }
}

/// Index into a page table at a given level (`0..512`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    /// Extract the index `va` selects at `level`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn of(va: VirtualAddress, level: PageLevel) -> Self {
        Self(((va.as_u64() >> level.shift()) & 0x1FF) as u16)
    }

    /// Construct from a raw `u16`.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 512` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < PAGE_TABLE_ENTRIES);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// One page-table frame: 512 entries, 4 KiB-aligned.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntry; PAGE_TABLE_ENTRIES],
}

const _: () = assert!(size_of::<PageTable>() == 4096);

impl PageTable {
    /// Create a fully zeroed table (all entries invalid).
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageEntry::zero(); PAGE_TABLE_ENTRIES],
        }
    }

    /// Read the entry at `i`.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PageEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PageEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Mutable access to the slot at `i`.
    #[inline]
    pub const fn slot_mut(&mut self, i: TableIndex) -> &mut PageEntry {
        &mut self.entries[i.as_usize()]
    }
}
