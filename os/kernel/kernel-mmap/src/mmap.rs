//! Creating mappings.

use crate::{FileHandle, Protection, Region, Sharing, UserMemory};
use kernel_info::memory::{PAGE_SIZE, TRAPFRAME};
use kernel_vmem::{FrameAlloc, PhysMapper, ReserveError, VirtualAddress, page_round_up};
use log::{debug, warn};

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum MmapError {
    #[error("mapping of zero length")]
    EmptyLength,
    #[error("mapping grants no access")]
    NoAccess,
    #[error("writable mapping must be readable")]
    WriteWithoutRead,
    #[error("file is not open for reading")]
    NotReadable,
    #[error("shared writable mapping of a file not open for writing")]
    NotWritable,
    #[error("no free region slot")]
    NoFreeRegion,
    #[error("mapping would reach the trap frame")]
    AddressSpaceExhausted,
    #[error("file offset range overflows")]
    OffsetOverflow,
    #[error("out of memory while reserving {0}")]
    OutOfMemory(VirtualAddress),
}

impl<M: PhysMapper> UserMemory<'_, M> {
    /// Map `length` bytes of `file` starting at `offset`.
    ///
    /// The mapping is placed at the page-rounded watermark and its pages are
    /// only reserved; each is read in from the file on first touch. Returns
    /// the base address.
    ///
    /// # Errors
    /// See [`MmapError`]. A failed call leaves the address space, the
    /// watermark and the region table as they were.
    pub fn mmap<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        length: u64,
        prot: Protection,
        sharing: Sharing,
        file: &FileHandle,
        offset: u64,
    ) -> Result<VirtualAddress, MmapError> {
        let checked = Self::check(length, prot, sharing, file).and_then(|()| {
            if self.regions.free_slots() == 0 {
                Err(MmapError::NoFreeRegion)
            } else {
                Ok(())
            }
        });
        if let Err(e) = checked {
            warn!("mmap: {e}");
            return Err(e);
        }

        if length > TRAPFRAME {
            return Err(MmapError::AddressSpaceExhausted);
        }
        let base = page_round_up(self.size);
        let length = page_round_up(length);
        if offset.checked_add(length).is_none() {
            warn!("mmap: offset {offset:#x} plus {length:#x} bytes overflows");
            return Err(MmapError::OffsetOverflow);
        }
        let end = base
            .checked_add(length)
            .filter(|&end| end <= TRAPFRAME)
            .ok_or(MmapError::AddressSpaceExhausted)?;
        let base = VirtualAddress::new(base);

        self.space
            .reserve(alloc, base, length / PAGE_SIZE)
            .map_err(|e| match e {
                ReserveError::OutOfMemory(va) => MmapError::OutOfMemory(va),
            })?;

        let region = Region {
            base,
            length,
            file: file.duplicate(),
            file_offset: offset,
            prot,
            sharing,
        };
        let slot = match self.regions.insert(region) {
            Ok(slot) => slot,
            Err(_) => {
                self.space.unmap(alloc, base, length / PAGE_SIZE, false);
                return Err(MmapError::NoFreeRegion);
            }
        };
        self.size = end;

        debug!(
            "mmap: region {slot} at {base}, {length:#x} bytes of inode {} from {offset:#x}, {prot:?} {sharing:?}",
            file.inode().inum()
        );
        Ok(base)
    }

    fn check(length: u64, prot: Protection, sharing: Sharing, file: &FileHandle) -> Result<(), MmapError> {
        if length == 0 {
            return Err(MmapError::EmptyLength);
        }
        if prot.is_none() {
            return Err(MmapError::NoAccess);
        }
        // Sv39 reserves W without R.
        if prot.write() && !prot.read() {
            return Err(MmapError::WriteWithoutRead);
        }
        if prot.read() && !file.readable() {
            return Err(MmapError::NotReadable);
        }
        if prot.write() && matches!(sharing, Sharing::Shared) && !file.writable() {
            return Err(MmapError::NotWritable);
        }
        Ok(())
    }
}
