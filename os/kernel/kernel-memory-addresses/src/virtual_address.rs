use crate::{MemoryAddress, MemoryAddressOffset, PageSize, VirtualPage, page_round_down, page_round_up};
use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// An address that goes through a page table: user pointers, region bases,
/// kernel stack and trampoline slots.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0x2000_0123);
/// assert_eq!(va.page::<Size4K>().base().as_u64(), 0x2000_0000);
/// assert_eq!(va.offset::<Size4K>().as_u64(), 0x123);
/// assert_eq!(va.page_round_up() - va.page_round_down(), 4096);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(pub(crate) MemoryAddress);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> VirtualPage<S> {
        VirtualPage(self.0.page())
    }

    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> MemoryAddressOffset<S> {
        self.0.offset()
    }

    #[inline]
    #[must_use]
    pub const fn split<S: PageSize>(self) -> (VirtualPage<S>, MemoryAddressOffset<S>) {
        (self.page(), self.offset())
    }

    /// Next 4 KiB boundary at or above this address.
    #[inline]
    #[must_use]
    pub const fn page_round_up(self) -> Self {
        Self::new(page_round_up(self.as_u64()))
    }

    /// 4 KiB boundary at or below this address.
    #[inline]
    #[must_use]
    pub const fn page_round_down(self) -> Self {
        Self::new(page_round_down(self.as_u64()))
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.0.is_aligned::<crate::Size4K>()
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA({:#x})", self.as_u64())
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

/// Bytes from `rhs` up to `self`. Debug builds panic if `rhs > self`.
impl Sub for VirtualAddress {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: Self) -> u64 {
        self.as_u64() - rhs.as_u64()
    }
}
