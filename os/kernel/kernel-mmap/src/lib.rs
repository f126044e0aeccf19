//! # Demand-Paged File Mappings
//!
//! Per-process `mmap`/`munmap` on top of the Sv39 address spaces from
//! `kernel-vmem`.
//!
//! ## Life of a mapping
//!
//! ```text
//!  mmap ──► reserve pages above the watermark (valid, U, lazy, no R/W/X)
//!      └──► claim a region slot (duplicated file handle, offset, protection)
//!
//!  first touch ──► page fault ──► handle_fault
//!                                 ├─ find the region containing the page
//!                                 ├─ allocate + zero a frame
//!                                 ├─ read one page of the file into it
//!                                 └─ install it with the region's protection
//!
//!  munmap ──► for every region the range overlaps:
//!             ├─ shared + writable: write backed pages to the file,
//!             │  one bounded transaction per chunk
//!             ├─ trim, split or free the region slot
//!             └─ drop the page-table leaves and free their frames
//! ```
//!
//! [`UserMemory`] ties one address space, its size watermark and its
//! [`RegionTable`] together and carries the process-level operations
//! (`fork`, `release`, heap growth).

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod fault;
pub mod file;
mod memory;
mod mmap;
mod munmap;
pub mod region;

pub use crate::fault::FaultError;
pub use crate::file::{FileHandle, FsError, Inode};
pub use crate::memory::{ForkError, UserMemory};
pub use crate::mmap::MmapError;
pub use crate::munmap::MunmapError;
pub use crate::region::{Protection, Region, RegionTable, Sharing};
