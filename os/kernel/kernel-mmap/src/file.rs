//! The slice of the file layer mappings need.
//!
//! Mappings only ever read and write whole byte ranges of an inode at an
//! offset; locking the inode is the implementation's business and lasts for
//! one call.

use alloc::sync::Arc;
use core::fmt;

/// File-system errors surfaced through mappings.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum FsError {
    #[error("device i/o error")]
    Io,
    #[error("no free blocks")]
    NoSpace,
}

/// An on-disk file as seen by the mapping code.
pub trait Inode: Send + Sync {
    /// Inode number, for diagnostics.
    fn inum(&self) -> u32;

    /// Read up to `dst.len()` bytes at `offset`. Returns the count read;
    /// reads past the end of the file are short, not errors.
    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<usize, FsError>;

    /// Write `src` at `offset`. Returns the count written; `0` means the
    /// file cannot take more.
    fn write_at(&self, offset: u64, src: &[u8]) -> Result<usize, FsError>;

    /// Open a file-system transaction.
    fn begin_op(&self);

    /// Close the transaction opened by the matching [`begin_op`](Self::begin_op).
    fn end_op(&self);
}

struct OpenFile {
    inode: Arc<dyn Inode>,
    readable: bool,
    writable: bool,
}

/// Reference-counted open file.
///
/// [`duplicate`](Self::duplicate) takes another reference; dropping (or
/// [`close`](Self::close)) gives it back.
pub struct FileHandle(Arc<OpenFile>);

impl FileHandle {
    pub fn open(inode: Arc<dyn Inode>, readable: bool, writable: bool) -> Self {
        Self(Arc::new(OpenFile {
            inode,
            readable,
            writable,
        }))
    }

    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self(Arc::clone(&self.0))
    }

    pub fn close(self) {
        drop(self);
    }

    #[must_use]
    pub fn readable(&self) -> bool {
        self.0.readable
    }

    #[must_use]
    pub fn writable(&self) -> bool {
        self.0.writable
    }

    #[must_use]
    pub fn inode(&self) -> &dyn Inode {
        &*self.0.inode
    }

    /// Live references to this open file, this one included.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("inum", &self.inode().inum())
            .field("readable", &self.readable())
            .field("writable", &self.writable())
            .finish()
    }
}

/// One file-system transaction; ends when dropped.
pub(crate) struct Transaction<'a> {
    inode: &'a dyn Inode,
}

impl<'a> Transaction<'a> {
    pub(crate) fn begin(inode: &'a dyn Inode) -> Self {
        inode.begin_op();
        Self { inode }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.inode.end_op();
    }
}
