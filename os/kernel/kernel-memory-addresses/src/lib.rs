//! # Virtual and Physical Memory Address Types
//!
//! Zero-cost wrappers that keep virtual and physical addresses apart at
//! compile time.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MemoryAddress`] | A raw 64-bit address of either kind. |
//! | [`MemoryPage<S>`] | A page-aligned base for page size `S`. |
//! | [`MemoryAddressOffset<S>`] | An offset inside a page of size `S`. |
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Translated (page-table) addresses. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | RAM or MMIO addresses. |
//!
//! Only one page size exists on this platform, [`Size4K`]; it is still carried
//! as a type parameter so page bases and offsets cannot be confused with plain
//! integers.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0000_0012_3456_7abc);
//! let (page, off) = va.split::<Size4K>();
//! assert_eq!(page.base().as_u64(), 0x0000_0012_3456_7000);
//! assert_eq!(off.as_u64(), 0xabc);
//! assert_eq!(page.join(off), va);
//!
//! assert_eq!(va.page_round_up().as_u64(), 0x0000_0012_3456_8000);
//! assert_eq!(va.page_round_down().as_u64(), 0x0000_0012_3456_7000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod memory_address;
mod memory_address_offset;
mod memory_page;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use memory_address::MemoryAddress;
pub use memory_address_offset::MemoryAddressOffset;
pub use memory_page::MemoryPage;
pub use page_size::{PageSize, Size4K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::{VirtualPage, VirtualPageRange};

/// Round `x` up to the next multiple of the 4 KiB page size.
#[inline(always)]
#[must_use]
pub const fn page_round_up(x: u64) -> u64 {
    (x + Size4K::MASK) & !Size4K::MASK
}

/// Round `x` down to a multiple of the 4 KiB page size.
#[inline(always)]
#[must_use]
pub const fn page_round_down(x: u64) -> u64 {
    x & !Size4K::MASK
}
