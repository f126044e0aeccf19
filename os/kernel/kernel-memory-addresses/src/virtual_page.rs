use crate::{MemoryAddressOffset, MemoryPage, PageSize, VirtualAddress};
use core::fmt;

/// Virtual memory page base for size `S`.
///
/// The low `S::SHIFT` bits of the base are always zero.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0x3f_ffff_f123);
/// let vp = va.page::<Size4K>();
/// assert_eq!(vp.base().as_u64() & Size4K::MASK, 0);
/// assert_eq!(vp.join(va.offset::<Size4K>()), va);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage<S: PageSize>(pub(crate) MemoryPage<S>);

impl<S: PageSize> VirtualPage<S> {
    /// Page that contains `addr` (aligns down to page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: VirtualAddress) -> Self {
        Self(MemoryPage::<S>::from_addr(addr.0))
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress(self.0.base())
    }

    #[inline]
    #[must_use]
    pub const fn join(self, off: MemoryAddressOffset<S>) -> VirtualAddress {
        VirtualAddress(self.0.join(off))
    }

    #[inline]
    #[must_use]
    pub const fn add_pages(self, count: u64) -> Self {
        Self(self.0.add_pages(count))
    }

    /// Pages in `[start, end)`, ascending. Empty when `end <= start`.
    #[inline]
    #[must_use]
    pub const fn range(start: Self, end: Self) -> VirtualPageRange<S> {
        VirtualPageRange { next: start, end }
    }
}

/// Iterator over a half-open run of virtual pages.
#[derive(Copy, Clone, Debug)]
pub struct VirtualPageRange<S: PageSize> {
    next: VirtualPage<S>,
    end: VirtualPage<S>,
}

impl<S: PageSize> Iterator for VirtualPageRange<S> {
    type Item = VirtualPage<S>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let page = self.next;
        self.next = page.add_pages(1);
        Some(page)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.end.0.number().saturating_sub(self.next.0.number());
        let n = usize::try_from(n).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

impl<S> fmt::Display for VirtualPage<S>
where
    S: PageSize,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<S: PageSize> fmt::Debug for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage<{}>({:#x})", S::NAME, self.0.base().as_u64())
    }
}
