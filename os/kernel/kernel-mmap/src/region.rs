//! # Region Table
//!
//! A fixed number of [`Region`] slots per process. A slot is either free
//! (`None`) or describes one file-backed range `[base, base + length)`.
//! Regions never overlap, and `base` and `length` stay page aligned through
//! every trim and split.

use crate::FileHandle;
use kernel_info::param::MAX_MAPPED_REGIONS;
use kernel_vmem::{LeafPermissions, VirtualAddress};
use log::debug;
use utils_accessors_derive::Setters;

/// Access a mapping grants to user code.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Setters)]
pub struct Protection {
    #[setters(get)]
    read: bool,
    #[setters(get)]
    write: bool,
    #[setters(get)]
    exec: bool,
}

impl Protection {
    /// No access.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            read: false,
            write: false,
            exec: false,
        }
    }

    #[must_use]
    pub const fn read_only() -> Self {
        Self::none().with_read(true)
    }

    #[must_use]
    pub const fn read_write() -> Self {
        Self::none().with_read(true).with_write(true)
    }

    #[must_use]
    pub const fn is_none(self) -> bool {
        !(self.read || self.write || self.exec)
    }

    /// Leaf permissions for a populated page of a mapping with this protection.
    #[must_use]
    pub const fn leaf_permissions(self) -> LeafPermissions {
        LeafPermissions::new()
            .with_read(self.read)
            .with_write(self.write)
            .with_exec(self.exec)
            .with_user(true)
    }
}

/// Whether stores reach the file.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Sharing {
    /// Changes are written back on unmap.
    Shared,
    /// Changes stay in memory.
    Private,
}

/// One mapped file range.
#[derive(Debug)]
pub struct Region {
    pub(crate) base: VirtualAddress,
    pub(crate) length: u64,
    pub(crate) file: FileHandle,
    pub(crate) file_offset: u64,
    pub(crate) prot: Protection,
    pub(crate) sharing: Sharing,
}

impl Region {
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    #[must_use]
    pub const fn length(&self) -> u64 {
        self.length
    }

    /// First address past the region.
    #[must_use]
    pub fn end(&self) -> VirtualAddress {
        self.base + self.length
    }

    #[must_use]
    pub const fn file(&self) -> &FileHandle {
        &self.file
    }

    /// File offset backing [`base`](Self::base).
    #[must_use]
    pub const fn file_offset(&self) -> u64 {
        self.file_offset
    }

    #[must_use]
    pub const fn protection(&self) -> Protection {
        self.prot
    }

    #[must_use]
    pub const fn sharing(&self) -> Sharing {
        self.sharing
    }

    #[must_use]
    pub fn contains(&self, va: VirtualAddress) -> bool {
        self.base <= va && va < self.end()
    }

    /// Whether `[low, high)` shares at least one byte with this region.
    #[must_use]
    pub fn overlaps(&self, low: VirtualAddress, high: VirtualAddress) -> bool {
        low < self.end() && self.base < high
    }

    /// Whether unmapping must write dirty pages back.
    #[must_use]
    pub const fn writes_back(&self) -> bool {
        matches!(self.sharing, Sharing::Shared) && self.prot.write
    }

    /// File offset of `va`, which must lie inside the region.
    #[must_use]
    pub fn file_offset_of(&self, va: VirtualAddress) -> u64 {
        debug_assert!(self.contains(va));
        self.file_offset + (va - self.base)
    }

    /// A copy of this region with its own file reference.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            base: self.base,
            length: self.length,
            file: self.file.duplicate(),
            file_offset: self.file_offset,
            prot: self.prot,
            sharing: self.sharing,
        }
    }
}

/// Fixed-capacity table of a process's mappings.
#[derive(Debug)]
pub struct RegionTable {
    slots: [Option<Region>; MAX_MAPPED_REGIONS],
}

impl Default for RegionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; MAX_MAPPED_REGIONS],
        }
    }

    /// Number of used slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn free_slots(&self) -> usize {
        MAX_MAPPED_REGIONS - self.len()
    }

    /// Put `region` into the first free slot and return its index.
    ///
    /// # Errors
    /// Hands `region` back if every slot is taken.
    pub fn insert(&mut self, region: Region) -> Result<usize, Region> {
        match self.slots.iter().position(Option::is_none) {
            Some(i) => {
                self.slots[i] = Some(region);
                Ok(i)
            }
            None => Err(region),
        }
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&Region> {
        self.slots.get(slot)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> Option<&mut Region> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Free `slot`, returning its region.
    pub fn remove(&mut self, slot: usize) -> Option<Region> {
        self.slots.get_mut(slot)?.take()
    }

    /// The region containing `va`, with its slot index.
    #[must_use]
    pub fn find(&self, va: VirtualAddress) -> Option<(usize, &Region)> {
        self.iter().find(|(_, r)| r.contains(va))
    }

    /// Used slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Region)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().map(|r| (i, r)))
    }

    /// Slot indices of every region overlapping `[low, high)`.
    pub(crate) fn overlapping(
        &self,
        low: VirtualAddress,
        high: VirtualAddress,
    ) -> impl Iterator<Item = usize> + '_ {
        self.iter()
            .filter(move |(_, r)| r.overlaps(low, high))
            .map(|(i, _)| i)
    }

    /// A copy of the table in which every region holds its own file
    /// reference. Slot indices are preserved.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        let mut copy = Self::new();
        for (i, region) in self.iter() {
            copy.slots[i] = Some(region.duplicate());
        }
        copy
    }

    /// Log every slot at debug level.
    pub fn dump(&self) {
        debug!("region table ({} of {MAX_MAPPED_REGIONS} used)", self.len());
        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                Some(r) => debug!(
                    "  region {i}: base {}, length {:#x}, inum {}, offset {:#x}, {:?}, {:?}",
                    r.base,
                    r.length,
                    r.file.inode().inum(),
                    r.file_offset,
                    r.prot,
                    r.sharing
                ),
                None => debug!("  region {i}: free"),
            }
        }
    }
}
