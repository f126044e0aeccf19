//! # Kernel Parameters

/// Maximum number of live processes.
pub const MAX_PROCESSES: usize = 64;

/// Mapped file regions a single process may hold at once.
pub const MAX_MAPPED_REGIONS: usize = 16;

/// Maximum number of blocks any file-system operation writes.
pub const MAX_OP_BLOCKS: u64 = 10;

/// File-system block size in bytes.
pub const BLOCK_SIZE: u64 = 1024;

/// Largest single write issued while flushing a shared mapping.
///
/// One transaction has room for [`MAX_OP_BLOCKS`] blocks; the inode, one
/// indirect block, and two blocks of slack for unaligned writes are taken off
/// the top, and every data block may need an allocation-bitmap block too.
pub const WRITEBACK_CHUNK_BYTES: u64 = ((MAX_OP_BLOCKS - 1 - 1 - 2) / 2) * BLOCK_SIZE;

const _: () = {
    assert!(WRITEBACK_CHUNK_BYTES > 0);
    assert!(WRITEBACK_CHUNK_BYTES == 3 * BLOCK_SIZE);
    assert!(MAX_MAPPED_REGIONS > 0);
};
