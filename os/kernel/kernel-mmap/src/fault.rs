//! Page-fault fill for reserved mapping pages.

use crate::UserMemory;
use kernel_info::memory::{MAX_VA, PAGE_SIZE};
use kernel_vmem::{EntryKind, FrameAlloc, PageLevel, PhysMapper, PhysMapperExt, VirtualAddress};
use log::{debug, error};

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum FaultError {
    #[error("{0} is not a reserved mapping page")]
    NotReserved(VirtualAddress),
    #[error("no region contains {0}")]
    NoRegion(VirtualAddress),
    #[error("out of memory while faulting in {0}")]
    OutOfMemory(VirtualAddress),
    #[error("reading the file for {0} failed")]
    Io(VirtualAddress),
}

impl<M: PhysMapper> UserMemory<'_, M> {
    /// Back the reserved page containing `va` with file contents.
    ///
    /// One page is read from the owning region's file at the page's offset
    /// into the region. Bytes past the end of the file read as zero.
    ///
    /// # Errors
    /// See [`FaultError`]. On error the page stays reserved and no frame is
    /// kept.
    pub fn handle_fault<A: FrameAlloc>(&self, alloc: &mut A, va: VirtualAddress) -> Result<(), FaultError> {
        if va.as_u64() >= MAX_VA {
            return Err(FaultError::NotReserved(va));
        }
        let page = va.page_round_down();
        let reserved = self
            .space
            .entry(page)
            .is_some_and(|e| e.kind(PageLevel::L0) == EntryKind::Reserved);
        if !reserved {
            return Err(FaultError::NotReserved(va));
        }

        let Some((slot, region)) = self.regions.find(page) else {
            error!("fault: reserved page {page} belongs to no region");
            return Err(FaultError::NoRegion(va));
        };

        let frame = alloc.alloc_4k().ok_or(FaultError::OutOfMemory(va))?;
        let bytes = self.space.mapper().frame_mut(frame);
        bytes.fill(0);

        let offset = region.file_offset_of(page);
        match region.file().inode().read_at(offset, &mut bytes[..]) {
            Ok(n) => {
                if (n as u64) < PAGE_SIZE {
                    debug!("fault: short read of {n} bytes at {offset:#x}");
                }
            }
            Err(e) => {
                error!("fault: reading inode {} at {offset:#x}: {e}", region.file().inode().inum());
                alloc.free_4k(frame);
                return Err(FaultError::Io(va));
            }
        }

        self.space
            .populate(page, frame, region.protection().leaf_permissions());
        debug!("fault: {page} backed by {frame} from region {slot}");
        Ok(())
    }
}
