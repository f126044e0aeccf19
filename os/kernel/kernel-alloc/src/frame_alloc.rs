//! Physical frame allocators.
//!
//! [`BitmapFrameAlloc`] keeps one bit per frame in a fixed array, so it needs
//! no heap and can run before anything else is set up. [`LockedFrameAlloc`]
//! wraps any allocator in a [`SpinLock`] so all harts can share it.

use kernel_info::memory::{KERNEL_BASE, PAGE_SIZE, PHYS_TOP};
use kernel_sync::SpinLock;
use kernel_vmem::{FrameAlloc, PhysicalPage, Size4K};
use log::debug;

/// Bitmap words needed to cover all RAM the kernel manages.
pub const RAM_BITMAP_WORDS: usize = ((PHYS_TOP - KERNEL_BASE) / PAGE_SIZE / 64) as usize;

/// Allocator sized for the whole of RAM.
pub type RamFrameAlloc = BitmapFrameAlloc<RAM_BITMAP_WORDS>;

/// Next-fit bitmap allocator over `frames` consecutive frames from `base`.
///
/// A set bit means "allocated". `WORDS * 64` bounds the number of frames.
pub struct BitmapFrameAlloc<const WORDS: usize> {
    base: PhysicalPage<Size4K>,
    frames: usize,
    bitmap: [u64; WORDS],
    /// Frame index the next search starts at.
    cursor: usize,
    in_use: usize,
}

impl<const WORDS: usize> BitmapFrameAlloc<WORDS> {
    /// All `frames` frames from `base` start out free.
    ///
    /// # Panics
    /// If `frames` exceeds the bitmap capacity.
    #[must_use]
    pub const fn new(base: PhysicalPage<Size4K>, frames: usize) -> Self {
        assert!(frames <= WORDS * 64, "bitmap too small for frame range");
        Self {
            base,
            frames,
            bitmap: [0; WORDS],
            cursor: 0,
            in_use: 0,
        }
    }

    /// Frames currently handed out.
    #[inline]
    #[must_use]
    pub const fn in_use(&self) -> usize {
        self.in_use
    }

    /// Frames this allocator manages.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.frames
    }

    /// Mark every frame below `end` as allocated (kernel image, boot data).
    pub fn claim_below(&mut self, end: PhysicalPage<Size4K>) {
        let upto = usize::try_from(end.number().saturating_sub(self.base.number()))
            .unwrap_or(usize::MAX)
            .min(self.frames);
        for i in 0..upto {
            if !self.is_set(i) {
                self.set(i, true);
                self.in_use += 1;
            }
        }
        self.cursor = self.cursor.max(upto) % self.frames.max(1);
        debug!("frame allocator: claimed {upto} frames below {end}");
    }

    #[inline]
    const fn is_set(&self, i: usize) -> bool {
        self.bitmap[i / 64] & (1 << (i % 64)) != 0
    }

    #[inline]
    const fn set(&mut self, i: usize, used: bool) {
        if used {
            self.bitmap[i / 64] |= 1 << (i % 64);
        } else {
            self.bitmap[i / 64] &= !(1 << (i % 64));
        }
    }

    fn index_of(&self, page: PhysicalPage<Size4K>) -> Option<usize> {
        let i = usize::try_from(page.number().checked_sub(self.base.number())?).ok()?;
        (i < self.frames).then_some(i)
    }
}

impl<const WORDS: usize> FrameAlloc for BitmapFrameAlloc<WORDS> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        if self.in_use == self.frames {
            return None;
        }
        let i = (0..self.frames)
            .map(|k| (self.cursor + k) % self.frames)
            .find(|&i| !self.is_set(i))?;
        self.set(i, true);
        self.in_use += 1;
        self.cursor = (i + 1) % self.frames;
        Some(self.base.add_pages(i as u64))
    }

    /// # Panics
    /// If `page` lies outside the managed range or is not allocated.
    fn free_4k(&mut self, page: PhysicalPage<Size4K>) {
        let Some(i) = self.index_of(page) else {
            panic!("free_4k: {page} not managed by this allocator");
        };
        assert!(self.is_set(i), "free_4k: double free of {page}");
        self.set(i, false);
        self.in_use -= 1;
    }
}

/// Frame allocator shared between harts.
///
/// `&LockedFrameAlloc<A>` implements [`FrameAlloc`], so every caller can hold
/// its own handle.
pub struct LockedFrameAlloc<A> {
    inner: SpinLock<A>,
}

impl<A: FrameAlloc> LockedFrameAlloc<A> {
    pub const fn new(inner: A) -> Self {
        Self {
            inner: SpinLock::named("kmem", inner),
        }
    }

    /// Run `f` with exclusive access to the wrapped allocator.
    pub fn with<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        self.inner.with_lock(f)
    }
}

impl<const WORDS: usize> LockedFrameAlloc<BitmapFrameAlloc<WORDS>> {
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.with(|a| a.in_use())
    }
}

impl<A: FrameAlloc> FrameAlloc for &LockedFrameAlloc<A> {
    #[inline]
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.inner.with_lock(|a| a.alloc_4k())
    }

    #[inline]
    fn free_4k(&mut self, page: PhysicalPage<Size4K>) {
        self.inner.with_lock(|a| a.free_4k(page));
    }
}
