//! # Direct-map [`PhysMapper`]
//!
//! The kernel identity-maps all of RAM, so a physical address is also a
//! usable pointer once paging is on. Host-side tests keep "physical RAM" in a
//! heap buffer instead and map `pa` to `buffer + (pa - ram_base)`; both are a
//! constant offset, which is all this mapper knows.
//!
//! ```rust
//! use kernel_alloc::phys_mapper::OffsetPhysMapper;
//! use kernel_vmem::{PhysicalAddress, PhysMapper};
//!
//! let mut word = 0u64;
//! let fake_pa = 0x8000_0000;
//! let mapper = OffsetPhysMapper::new(((&raw mut word) as u64).wrapping_sub(fake_pa));
//! unsafe { *mapper.phys_to_mut::<u64>(PhysicalAddress::new(fake_pa)) = 7 };
//! assert_eq!(word, 7);
//! ```

use kernel_vmem::{PhysMapper, PhysicalAddress};

/// [`PhysMapper`] that adds a fixed offset to every physical address.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct OffsetPhysMapper {
    offset: u64,
}

impl OffsetPhysMapper {
    /// Physical addresses are virtual addresses (kernel direct map).
    #[must_use]
    pub const fn identity() -> Self {
        Self { offset: 0 }
    }

    /// `pa` is reachable at `pa + offset` (wrapping).
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }

    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }
}

impl PhysMapper for OffsetPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = pa.as_u64().wrapping_add(self.offset) as *mut T;
        // SAFETY: Caller must ensure the physical address is covered by the mapping.
        unsafe { &mut *va }
    }
}
