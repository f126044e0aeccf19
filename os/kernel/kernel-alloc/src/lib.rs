//! # Physical Memory Collaborators
//!
//! Implementations of the two traits the paging code in `kernel-vmem` is
//! written against:
//!
//! ```text
//! ┌──────────────────────────────┐     ┌──────────────────────────────┐
//! │ FrameAlloc                   │     │ PhysMapper                   │
//! │  BitmapFrameAlloc  (1 CPU)   │     │  OffsetPhysMapper            │
//! │  LockedFrameAlloc  (shared)  │     │   identity on the target,    │
//! │                              │     │   heap offset in tests       │
//! └──────────────────────────────┘     └──────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kernel_alloc::frame_alloc::{BitmapFrameAlloc, LockedFrameAlloc};
//! use kernel_vmem::{FrameAlloc, PhysicalAddress};
//!
//! let base = PhysicalAddress::new(0x8040_0000).page();
//! let shared = LockedFrameAlloc::new(BitmapFrameAlloc::<1>::new(base, 64));
//! let mut handle = &shared;
//! let frame = handle.alloc_4k().unwrap();
//! assert_eq!(frame, base);
//! handle.free_4k(frame);
//! assert_eq!(shared.in_use(), 0);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod frame_alloc;
pub mod phys_mapper;
