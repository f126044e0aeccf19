//! # Sv39 Page-Table Entries
//!
//! - [`PageEntryBits`]: the raw 64-bit layout with typed accessors.
//! - [`PageEntry`]: one slot of a [`PageTable`](crate::PageTable), classified
//!   through [`PageEntry::kind`].
//! - [`LeafPermissions`]: the permission subset a leaf mapping carries.

use crate::PageLevel;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalPage, Size4K};
use utils_accessors_derive::Setters;

/// A single 64-bit Sv39 page-table entry in its raw bitfield form.
///
/// ### Bit layout
///
/// | Bits   | Name           | Meaning |
/// |--------|----------------|---------|
/// | 0      | `V`            | Entry is valid |
/// | 1      | `R`            | Readable |
/// | 2      | `W`            | Writable |
/// | 3      | `X`            | Executable |
/// | 4      | `U`            | Accessible from user mode |
/// | 5      | `G`            | Global mapping |
/// | 6      | `A`            | Accessed |
/// | 7      | `D`            | Dirty |
/// | 8      | `lazy`         | Reserved for a file mapping, not backed (software) |
/// | 9      | `os_available` | Free for software use |
/// | 10–53  | `ppn`          | Physical page number |
/// | 54–63  | reserved       | Must be zero |
///
/// ### Notes
/// - `R`/`W`/`X` all clear on a valid entry means "pointer to the next table".
/// - Hardware ignores the `lazy` bit; it is only meaningful to this kernel.
///
/// ### Example
/// ```rust
/// # use kernel_vmem::PageEntryBits;
/// let e = PageEntryBits::new()
///     .with_valid(true)
///     .with_readable(true)
///     .with_ppn(0x80001);
/// assert_eq!(e.into_bits(), (0x80001 << 10) | 0b11);
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Valid (V, bit 0).
    pub valid: bool,
    /// Readable (R, bit 1).
    pub readable: bool,
    /// Writable (W, bit 2). Hardware forbids `W` without `R`.
    pub writable: bool,
    /// Executable (X, bit 3).
    pub executable: bool,
    /// User (U, bit 4). Set for pages user mode may touch.
    pub user: bool,
    /// Global (G, bit 5). Present in every address space.
    pub global: bool,
    /// Accessed (A, bit 6).
    pub accessed: bool,
    /// Dirty (D, bit 7).
    pub dirty: bool,
    /// Reserved-but-unbacked marker (RSW bit 8).
    pub lazy: bool,
    /// Unused software bit (RSW bit 9).
    pub os_available: bool,
    /// Physical page number (bits 10–53).
    #[bits(44)]
    pub ppn: u64,
    #[bits(10)]
    __: u16,
}

/// Permissions of a leaf mapping.
///
/// ```rust
/// # use kernel_vmem::LeafPermissions;
/// let p = LeafPermissions::new().with_read(true).with_user(true);
/// assert!(p.read() && p.user() && !p.write());
/// ```
#[allow(clippy::struct_excessive_bools)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Setters)]
pub struct LeafPermissions {
    #[setters(get)]
    read: bool,
    #[setters(get)]
    write: bool,
    #[setters(get)]
    exec: bool,
    #[setters(get)]
    user: bool,
    #[setters(get)]
    global: bool,
}

impl LeafPermissions {
    /// No access at all.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            read: false,
            write: false,
            exec: false,
            user: false,
            global: false,
        }
    }

    /// User read/write/execute, as used for heap and stack growth.
    #[inline]
    #[must_use]
    pub const fn user_rwx() -> Self {
        Self::new()
            .with_read(true)
            .with_write(true)
            .with_exec(true)
            .with_user(true)
    }

    /// Kernel read/write (data, RAM, MMIO, stacks).
    #[inline]
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self::new().with_read(true).with_write(true)
    }

    /// Kernel read/execute (text, trampoline).
    #[inline]
    #[must_use]
    pub const fn kernel_rx() -> Self {
        Self::new().with_read(true).with_exec(true)
    }

    /// `true` if none of R/W/X is granted.
    #[inline]
    #[must_use]
    pub const fn is_inaccessible(self) -> bool {
        !(self.read || self.write || self.exec)
    }

    #[inline]
    #[must_use]
    const fn from_bits(bits: PageEntryBits) -> Self {
        Self {
            read: bits.readable(),
            write: bits.writable(),
            exec: bits.executable(),
            user: bits.user(),
            global: bits.global(),
        }
    }

    #[inline]
    #[must_use]
    const fn apply(self, bits: PageEntryBits) -> PageEntryBits {
        bits.with_readable(self.read)
            .with_writable(self.write)
            .with_executable(self.exec)
            .with_user(self.user)
            .with_global(self.global)
    }
}

/// What a [`PageEntry`] holds, given the level it was found at.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntryKind {
    /// `V = 0`.
    Invalid,
    /// Pointer to the next-level table (only above L0).
    Table(PhysicalPage<Size4K>),
    /// A mapped frame and its permissions.
    Leaf(PhysicalPage<Size4K>, LeafPermissions),
    /// A user page reserved for a file mapping, not yet backed.
    Reserved,
}

/// One slot of a page table.
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct PageEntry(PageEntryBits);

impl PageEntry {
    /// Create a zero (invalid) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// Pointer to a next-level table.
    #[inline]
    #[must_use]
    pub const fn table(next: PhysicalPage<Size4K>) -> Self {
        Self(PageEntryBits::new().with_valid(true).with_ppn(next.number()))
    }

    /// A leaf mapping `frame` with `perms`.
    ///
    /// A leaf without any of R/W/X would read back as a table pointer, so at
    /// least one must be granted.
    #[inline]
    #[must_use]
    pub const fn leaf(frame: PhysicalPage<Size4K>, perms: LeafPermissions) -> Self {
        assert!(!perms.is_inaccessible(), "leaf mapping without R/W/X");
        Self(perms.apply(PageEntryBits::new().with_valid(true).with_ppn(frame.number())))
    }

    /// A reserved-but-unbacked user slot.
    #[inline]
    #[must_use]
    pub const fn reserved() -> Self {
        Self(PageEntryBits::new().with_valid(true).with_user(true).with_lazy(true))
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0.valid()
    }

    /// Expose the underlying bitfield.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> PageEntryBits {
        self.0
    }

    /// Return the raw 64-bit value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0.into_bits()
    }

    /// Construct from a raw 64-bit value. No validation is performed.
    #[inline]
    #[must_use]
    pub const fn from_raw(v: u64) -> Self {
        Self(PageEntryBits::from_bits(v))
    }

    /// Drop the user bit, keeping everything else.
    #[inline]
    pub const fn clear_user(&mut self) {
        self.0 = self.0.with_user(false);
    }

    /// Classify this entry as found at `level`.
    ///
    /// # Panics
    /// On any bit pattern this kernel never writes: a table pointer at L0,
    /// a lazy entry with permissions or a frame, or reserved bits set.
    #[must_use]
    pub fn kind(self, level: PageLevel) -> EntryKind {
        let b = self.0;
        if !b.valid() {
            return EntryKind::Invalid;
        }
        let page = PhysicalPage::from_number(b.ppn());
        let rwx = b.readable() || b.writable() || b.executable();
        let reserved_bits = self.raw() >> 54 != 0;
        match (rwx, b.lazy()) {
            _ if reserved_bits => corrupt(self, level),
            (false, false) if level != PageLevel::L0 => EntryKind::Table(page),
            (true, false) => EntryKind::Leaf(page, LeafPermissions::from_bits(b)),
            (false, true) if b.ppn() == 0 => EntryKind::Reserved,
            _ => corrupt(self, level),
        }
    }
}

#[cold]
fn corrupt(e: PageEntry, level: PageLevel) -> ! {
    panic!("corrupt page table entry {:#018x} at {level:?}", e.raw());
}

impl core::fmt::Debug for PageEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PageEntry({:#018x})", self.raw())
    }
}
