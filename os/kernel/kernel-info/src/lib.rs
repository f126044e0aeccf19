//! # Kernel Configuration
//!
//! Compile-time constants that describe the machine the kernel runs on and
//! the tunables of its memory subsystem. Everything here is `const`; there is
//! no runtime configuration surface.
//!
//! ## Modules
//!
//! ### Memory Layout ([`memory`])
//! Architectural paging parameters (three translation levels, 512 entries per
//! table, 4 KiB pages) and the physical/virtual layout of the kernel:
//!
//! ```text
//! Virtual Address Space Layout (Sv39, 256 GiB usable):
//!
//! 0x00_0000_0000 ┌─────────────────────────────────┐
//!                │  User text, data, heap          │
//!                │  (grows up to the watermark)    │
//!                ├─────────────────────────────────┤
//!                │  Demand-paged file mappings     │
//!                │  (reserved above the watermark) │
//!                │              ...                │
//!  KERNEL_STACK  ├─────────────────────────────────┤
//!                │  Kernel stacks + guard pages    │
//!  TRAPFRAME     ├─────────────────────────────────┤
//!  TRAMPOLINE    ├─────────────────────────────────┤
//!                │  Trap entry/exit code           │
//! MAX_VA         └─────────────────────────────────┘ 0x40_0000_0000
//! ```
//!
//! Physical memory is direct-mapped by the kernel page table: device
//! registers below [`KERNEL_BASE`](memory::KERNEL_BASE) and RAM from
//! [`KERNEL_BASE`](memory::KERNEL_BASE) to [`PHYS_TOP`](memory::PHYS_TOP).
//!
//! ### Kernel Parameters ([`param`])
//! Table capacities and file-system transaction limits that bound the
//! mapping subsystem, e.g. the number of mapped regions per process and the
//! largest single write a writeback may issue.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod param;
