//! Byte copies between kernel buffers and a user address space.
//!
//! Every page is resolved through [`AddressSpace::translate`], so only
//! user-accessible, backed pages take part. A copy that hits an unusable page
//! stops there; bytes already copied stay copied.

use crate::{AddressSpace, PhysMapper, PhysMapperExt};
use kernel_memory_addresses::{PhysicalAddress, Size4K, VirtualAddress};

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum CopyError {
    #[error("{0} is not mapped for user access")]
    Unmapped(VirtualAddress),
    #[error("no NUL terminator within {0} bytes")]
    Unterminated(usize),
}

impl<M: PhysMapper> AddressSpace<'_, M> {
    /// One page's worth of a copy starting at `va`: the backing physical
    /// address and how many of the `remaining` bytes fit before the page ends.
    fn user_chunk(&self, va: VirtualAddress, remaining: usize) -> Result<(PhysicalAddress, usize), CopyError> {
        let pa = self
            .translate(va.page_round_down())
            .ok_or(CopyError::Unmapped(va))?;
        let offset = va.offset::<Size4K>();
        let room = usize::try_from(offset.remaining()).unwrap_or(usize::MAX);
        Ok((pa.page::<Size4K>().join(offset), remaining.min(room)))
    }

    fn user_bytes(&self, pa: PhysicalAddress, len: usize) -> &mut [u8] {
        let off = pa.offset::<Size4K>().as_usize();
        &mut self.mapper.frame_mut(pa.page())[off..off + len]
    }

    /// Copy `src` to user address `dst`.
    ///
    /// # Errors
    /// [`CopyError::Unmapped`] for the first page that is not a user-accessible
    /// backed mapping.
    pub fn copy_out(&self, mut dst: VirtualAddress, mut src: &[u8]) -> Result<(), CopyError> {
        while !src.is_empty() {
            let (pa, n) = self.user_chunk(dst, src.len())?;
            self.user_bytes(pa, n).copy_from_slice(&src[..n]);
            src = &src[n..];
            dst += n as u64;
        }
        Ok(())
    }

    /// Fill `dst` from user address `src`.
    ///
    /// # Errors
    /// [`CopyError::Unmapped`] for the first page that is not a user-accessible
    /// backed mapping.
    pub fn copy_in(&self, dst: &mut [u8], mut src: VirtualAddress) -> Result<(), CopyError> {
        let mut done = 0;
        while done < dst.len() {
            let (pa, n) = self.user_chunk(src, dst.len() - done)?;
            dst[done..done + n].copy_from_slice(self.user_bytes(pa, n));
            done += n;
            src += n as u64;
        }
        Ok(())
    }

    /// Copy a NUL-terminated string from user address `src` into `dst`.
    ///
    /// At most `max` bytes (and never more than `dst.len()`) are examined,
    /// terminator included. On success `dst` holds the string followed by a
    /// NUL and the string length is returned.
    ///
    /// # Errors
    /// - [`CopyError::Unterminated`] if no NUL appears within the limit.
    /// - [`CopyError::Unmapped`] for the first page that is not a
    ///   user-accessible backed mapping.
    pub fn copy_in_str(&self, dst: &mut [u8], mut src: VirtualAddress, max: usize) -> Result<usize, CopyError> {
        let max = max.min(dst.len());
        let mut done = 0;
        while done < max {
            let (pa, n) = self.user_chunk(src, max - done)?;
            let chunk = self.user_bytes(pa, n);
            if let Some(nul) = chunk.iter().position(|&b| b == 0) {
                dst[done..=done + nul].copy_from_slice(&chunk[..=nul]);
                return Ok(done + nul);
            }
            dst[done..done + n].copy_from_slice(chunk);
            done += n;
            src += n as u64;
        }
        Err(CopyError::Unterminated(max))
    }
}
