//! Removing mappings, with writeback for shared writable regions.

use crate::file::Transaction;
use crate::{FsError, Region, UserMemory};
use kernel_info::memory::{MAX_VA, PAGE_SIZE};
use kernel_info::param::{MAX_MAPPED_REGIONS, WRITEBACK_CHUNK_BYTES};
use kernel_vmem::{
    EntryKind, FrameAlloc, PageLevel, PhysMapper, PhysMapperExt, PhysicalPage, Size4K,
    VirtualAddress, VirtualPage, page_round_up,
};
use log::{debug, error, trace};

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum MunmapError {
    #[error("unmapping the middle of a region needs a free region slot")]
    NoFreeRegion,
    #[error("writeback failed: {0}")]
    Writeback(#[from] FsError),
}

/// What one page's writeback ended with.
enum Written {
    Page,
    FileFull,
}

impl<M: PhysMapper> UserMemory<'_, M> {
    /// Unmap `[addr, addr + length)`, widened to whole pages.
    ///
    /// Every region the range overlaps loses the overlapping part: shared
    /// writable regions first write their backed pages to the file, then the
    /// pages are unmapped and the region is trimmed, split or freed. Ranges
    /// no region covers are ignored.
    ///
    /// # Errors
    /// - [`MunmapError::NoFreeRegion`] if a region would split and the table
    ///   is full. Nothing is changed.
    /// - [`MunmapError::Writeback`] if writing a page back failed. The range
    ///   is still unmapped.
    pub fn munmap<A: FrameAlloc>(&mut self, alloc: &mut A, addr: VirtualAddress, length: u64) -> Result<(), MunmapError> {
        if length == 0 {
            return Ok(());
        }
        let low = addr.page_round_down();
        let high = VirtualAddress::new(page_round_up(addr.as_u64().saturating_add(length).min(MAX_VA)));

        let splits = self
            .regions
            .overlapping(low, high)
            .filter(|&i| self.regions.get(i).is_some_and(|r| r.base() < low && high < r.end()))
            .count();
        if splits > self.regions.free_slots() {
            error!("munmap: [{low}, {high}) would split a region, table full");
            return Err(MunmapError::NoFreeRegion);
        }

        let mut result = Ok(());
        for slot in 0..MAX_MAPPED_REGIONS {
            let Some(region) = self.regions.get(slot).filter(|r| r.overlaps(low, high)) else {
                continue;
            };
            let lo = low.max(region.base());
            let hi = high.min(region.end());

            if region.writes_back()
                && let Err(e) = self.write_back(region, lo, hi)
            {
                error!("munmap: writeback of region {slot} failed: {e}");
                if result.is_ok() {
                    result = Err(MunmapError::Writeback(e));
                }
            }

            self.space.unmap(alloc, lo, (hi - lo) / PAGE_SIZE, true);
            self.trim(slot, lo, hi);
        }
        result
    }

    /// Write the backed pages of `[lo, hi)` to the region's file.
    ///
    /// Stops at the first page the file takes nothing of.
    fn write_back(&self, region: &Region, lo: VirtualAddress, hi: VirtualAddress) -> Result<(), FsError> {
        let first = VirtualPage::<Size4K>::containing_address(lo);
        let end = VirtualPage::<Size4K>::containing_address(hi);
        for page in VirtualPage::range(first, end) {
            let Some(EntryKind::Leaf(frame, _)) = self
                .space
                .entry(page.base())
                .map(|e| e.kind(PageLevel::L0))
            else {
                continue;
            };
            if let Written::FileFull = self.write_back_page(region, page.base(), frame)? {
                debug!("munmap: file full at {}", page.base());
                break;
            }
        }
        Ok(())
    }

    /// Write one page in chunks of at most [`WRITEBACK_CHUNK_BYTES`], each in
    /// its own transaction.
    #[allow(clippy::cast_possible_truncation)]
    fn write_back_page(
        &self,
        region: &Region,
        va: VirtualAddress,
        frame: PhysicalPage<Size4K>,
    ) -> Result<Written, FsError> {
        let inode = region.file().inode();
        let bytes = self.space.mapper().frame_mut(frame);
        let file_offset = region.file_offset_of(va);

        let mut done = 0;
        while done < PAGE_SIZE {
            let n = WRITEBACK_CHUNK_BYTES.min(PAGE_SIZE - done);
            let chunk = &bytes[done as usize..(done + n) as usize];
            let written = {
                let _tx = Transaction::begin(inode);
                inode.write_at(file_offset + done, chunk)?
            };
            trace!(
                "munmap: inode {} wrote {written} of {n} bytes at {:#x}",
                inode.inum(),
                file_offset + done
            );
            if written == 0 {
                return Ok(Written::FileFull);
            }
            done += written as u64;
        }
        Ok(Written::Page)
    }

    /// Drop `[lo, hi)` from the region in `slot`.
    fn trim(&mut self, slot: usize, lo: VirtualAddress, hi: VirtualAddress) {
        let Some(region) = self.regions.get_mut(slot) else {
            return;
        };
        let (base, end) = (region.base(), region.end());

        if lo == base && hi == end {
            debug!("munmap: region {slot} at {base} released");
            self.regions.remove(slot);
        } else if lo == base {
            region.base = hi;
            region.file_offset += hi - base;
            region.length = end - hi;
        } else if hi == end {
            region.length = lo - base;
        } else {
            let tail = Region {
                base: hi,
                length: end - hi,
                file: region.file.duplicate(),
                file_offset: region.file_offset + (hi - base),
                prot: region.prot,
                sharing: region.sharing,
            };
            region.length = lo - base;
            if self.regions.insert(tail).is_err() {
                unreachable!("munmap: split slot was checked up front");
            }
            debug!("munmap: region {slot} split at [{lo}, {hi})");
        }
    }
}
