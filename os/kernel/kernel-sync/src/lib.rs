//! # Kernel synchronization primitives
//!
//! The memory subsystem needs exactly one: a [`SpinLock`] guarding state that
//! several harts share, such as the physical frame allocator.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
