//! # Kernel Address Space
//!
//! Builds the single page table the kernel runs on:
//!
//! ```text
//! MAX_VA ─┬─ TRAMPOLINE          R/X  (shared with every user space)
//!         ├─ kernel stack 0      R/W
//!         ├─ guard               unmapped
//!         ├─ kernel stack 1      R/W
//!         ├─ ...
//! PHYS_TOP┼─ ...
//!         │  RAM after text      R/W  (identity)
//! KERNBASE┼─ kernel text         R/X  (identity)
//!         ├─ VIRTIO0             R/W  (identity)
//!         ├─ UART0               R/W  (identity)
//!         └─ PLIC                R/W  (identity)
//! ```
//!
//! Any failure here leaves the machine unable to boot, so mapping errors
//! panic instead of returning.

use crate::{AddressSpace, FrameAlloc, LeafPermissions, PhysMapper, PhysMapperExt};
use kernel_info::memory::{
    KERNEL_BASE, PAGE_SIZE, PHYS_TOP, PLIC, PLIC_SIZE, TRAMPOLINE, UART0, VIRTIO0, kernel_stack,
};
use kernel_info::param::MAX_PROCESSES;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use log::debug;

/// Where the linker placed the pieces the kernel map needs.
#[derive(Debug, Clone, Copy)]
pub struct KernelLayout {
    /// First byte after kernel text (`etext`), page aligned.
    pub text_end: PhysicalAddress,
    /// Frame holding the trap entry/exit code.
    pub trampoline: PhysicalPage<Size4K>,
}

/// Identity-map devices and RAM, map the trampoline, and allocate one kernel
/// stack per process slot.
///
/// # Panics
/// If frames run out or `layout.text_end` is outside `[KERNEL_BASE, PHYS_TOP]`.
pub fn build_kernel_space<'m, M: PhysMapper, A: FrameAlloc>(
    mapper: &'m M,
    alloc: &mut A,
    layout: &KernelLayout,
) -> AddressSpace<'m, M> {
    let text_end = layout.text_end.as_u64();
    assert!(
        (KERNEL_BASE..=PHYS_TOP).contains(&text_end) && layout.text_end.is_aligned::<Size4K>(),
        "kernel text end {} outside RAM",
        layout.text_end
    );

    let Ok(kernel) = AddressSpace::create(mapper, alloc) else {
        panic!("build_kernel_space: no frame for the root table");
    };

    let identity = |alloc: &mut A, base: u64, size: u64, perms: LeafPermissions| {
        kernel.map_kernel(
            alloc,
            VirtualAddress::new(base),
            PhysicalAddress::new(base),
            size,
            perms,
        );
    };
    identity(alloc, UART0, PAGE_SIZE, LeafPermissions::kernel_rw());
    identity(alloc, VIRTIO0, PAGE_SIZE, LeafPermissions::kernel_rw());
    identity(alloc, PLIC, PLIC_SIZE, LeafPermissions::kernel_rw());
    if text_end > KERNEL_BASE {
        identity(alloc, KERNEL_BASE, text_end - KERNEL_BASE, LeafPermissions::kernel_rx());
    }
    if text_end < PHYS_TOP {
        identity(alloc, text_end, PHYS_TOP - text_end, LeafPermissions::kernel_rw());
    }

    kernel.map_kernel(
        alloc,
        VirtualAddress::new(TRAMPOLINE),
        layout.trampoline.base(),
        PAGE_SIZE,
        LeafPermissions::kernel_rx(),
    );

    for slot in 0..MAX_PROCESSES {
        let Some(stack) = alloc.alloc_4k() else {
            panic!("build_kernel_space: no frame for kernel stack {slot}");
        };
        mapper.zero_frame(stack);
        kernel.map_kernel(
            alloc,
            VirtualAddress::new(kernel_stack(slot)),
            stack.base(),
            PAGE_SIZE,
            LeafPermissions::kernel_rw(),
        );
    }

    debug!("kernel address space built, satp {:#018x}", kernel.satp());
    kernel
}
