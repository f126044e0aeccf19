//! # Memory Layout

/// Bytes per page (and per physical frame).
pub const PAGE_SIZE: u64 = 4096;

/// log2 of [`PAGE_SIZE`]; number of offset bits in an address.
pub const PAGE_SHIFT: u32 = 12;

/// Number of translation levels walked by the hardware.
pub const PAGE_TABLE_LEVELS: usize = 3;

/// Entries per page-table page (9 index bits per level).
pub const PAGE_TABLE_ENTRIES: usize = 512;

/// Bits of the virtual address consumed by one level's index.
pub const PAGE_TABLE_INDEX_BITS: u32 = 9;

/// One beyond the highest virtual address.
///
/// Sv39 allows 39 bits, but addresses with bit 38 set would have to be
/// sign-extended; staying below bit 38 avoids that entirely.
pub const MAX_VA: u64 = 1 << (PAGE_TABLE_INDEX_BITS * 3 + PAGE_SHIFT - 1);

/// Translation mode value for Sv39 in the top bits of `satp`.
pub const SATP_SV39: u64 = 8 << 60;

/// Start of RAM; the kernel image is loaded here.
pub const KERNEL_BASE: u64 = 0x8000_0000;

/// End of the RAM the kernel direct-maps (128 MiB).
pub const PHYS_TOP: u64 = KERNEL_BASE + 128 * 1024 * 1024;

/// UART 16550 registers.
pub const UART0: u64 = 0x1000_0000;

/// Virtio MMIO disk interface.
pub const VIRTIO0: u64 = 0x1000_1000;

/// Platform-level interrupt controller.
pub const PLIC: u64 = 0x0c00_0000;

/// Size of the PLIC register window.
pub const PLIC_SIZE: u64 = 0x40_0000;

/// Trap entry/exit page, mapped at the highest page in both user and kernel
/// address spaces.
pub const TRAMPOLINE: u64 = MAX_VA - PAGE_SIZE;

/// Per-process trap frame, just below the trampoline.
pub const TRAPFRAME: u64 = TRAMPOLINE - PAGE_SIZE;

/// Virtual address of the kernel stack for process slot `slot`.
///
/// Each stack is one page and is followed (downwards) by an unmapped guard
/// page, so a stack overflow faults instead of corrupting its neighbour.
#[must_use]
pub const fn kernel_stack(slot: usize) -> u64 {
    TRAMPOLINE - ((slot as u64) + 1) * 2 * PAGE_SIZE
}

const _: () = {
    assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
    assert!(PAGE_TABLE_ENTRIES == 1 << PAGE_TABLE_INDEX_BITS);
    assert!(MAX_VA == 0x40_0000_0000);
    assert!(PHYS_TOP > KERNEL_BASE);
    assert!(PHYS_TOP.is_multiple_of(PAGE_SIZE));
    assert!(TRAPFRAME < TRAMPOLINE);
};
