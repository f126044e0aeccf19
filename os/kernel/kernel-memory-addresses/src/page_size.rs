//! Page-size markers.

use core::fmt;
use core::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

/// A page size the translation hardware can map at a leaf.
///
/// Sv39 also allows 2 MiB and 1 GiB leaves at L1 and L2. The kernel only
/// installs 4 KiB leaves, so [`Size4K`] is the sole implementor.
pub trait PageSize: sealed::Sealed + Copy + Ord + Hash + fmt::Debug {
    /// log2 of the page size; the number of offset bits in an address.
    const SHIFT: u32;
    /// Page size in bytes.
    const SIZE: u64 = 1 << Self::SHIFT;
    /// Offset bits of an address.
    const MASK: u64 = Self::SIZE - 1;
    /// Short name used in diagnostics.
    const NAME: &'static str;
}

/// 4 KiB page.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size4K;

impl sealed::Sealed for Size4K {}

impl PageSize for Size4K {
    const SHIFT: u32 = 12;
    const NAME: &'static str = "4K";
}
