mod common;

use common::{Machine, PAGE, RamInode, WriteRecord, kind_at, open, pattern, read_user};
use kernel_mmap::{FaultError, FsError, MunmapError, Protection, Sharing, UserMemory};
use kernel_vmem::{EntryKind, VirtualAddress};

#[test]
fn prefix_unmap_writes_back_in_bounded_chunks() {
    let machine = Machine::new();
    let mut alloc = machine.alloc();
    let mut mem = UserMemory::create(&machine.mapper, &mut alloc).unwrap();
    mem.grow(&mut alloc, PAGE).unwrap();

    let data = pattern(2 * PAGE as usize);
    let inode = RamInode::new(20, data.clone());
    let file = open(&inode, true, true);
    let base = mem
        .mmap(&mut alloc, 2 * PAGE, Protection::read_write(), Sharing::Shared, &file, 0)
        .unwrap();
    mem.handle_fault(&mut alloc, base).unwrap();
    mem.handle_fault(&mut alloc, base + PAGE).unwrap();
    mem.space().copy_out(base + 100, b"first page").unwrap();
    mem.space().copy_out(base + PAGE + 100, b"second page").unwrap();

    let before = machine.in_use();
    mem.munmap(&mut alloc, base, PAGE).unwrap();

    let writes = inode.writes();
    assert_eq!(
        writes,
        vec![
            WriteRecord { offset: 0, len: 3072, written: 3072, in_tx: true },
            WriteRecord { offset: 3072, len: 1024, written: 1024, in_tx: true },
        ]
    );
    assert_eq!(inode.transactions(), 2);
    assert_eq!(inode.open_transactions(), 0);

    let contents = inode.contents();
    assert_eq!(&contents[100..110], b"first page");
    assert_eq!(contents[PAGE as usize..], data[PAGE as usize..]);

    let (_, region) = mem.regions().iter().next().unwrap();
    assert_eq!(region.base(), base + PAGE);
    assert_eq!(region.length(), PAGE);
    assert_eq!(region.file_offset(), PAGE);

    assert_eq!(machine.in_use(), before - 1);
    assert_eq!(kind_at(&mem, base), EntryKind::Invalid);
    assert_eq!(read_user(&mem, base + PAGE + 100, 11), b"second page");

    // The rest goes out at the advanced file offset.
    mem.munmap(&mut alloc, base + PAGE, PAGE).unwrap();
    assert_eq!(&inode.contents()[PAGE as usize + 100..PAGE as usize + 111], b"second page");
    assert_eq!(inode.writes()[2].offset, PAGE);
    assert!(mem.regions().is_empty());
    assert_eq!(file.ref_count(), 1);

    mem.release(&mut alloc).unwrap();
    assert_eq!(machine.in_use(), 0);
}

#[test]
fn suffix_unmap_keeps_the_front() {
    let machine = Machine::new();
    let mut alloc = machine.alloc();
    let mut mem = UserMemory::create(&machine.mapper, &mut alloc).unwrap();
    let inode = RamInode::new(21, pattern(3 * PAGE as usize));
    let file = open(&inode, true, true);
    let base = mem
        .mmap(&mut alloc, 3 * PAGE, Protection::read_only(), Sharing::Shared, &file, PAGE)
        .unwrap();

    mem.munmap(&mut alloc, base + 2 * PAGE, PAGE).unwrap();
    let (_, region) = mem.regions().iter().next().unwrap();
    assert_eq!(region.base(), base);
    assert_eq!(region.length(), 2 * PAGE);
    assert_eq!(region.file_offset(), PAGE);
    assert_eq!(kind_at(&mem, base + PAGE), EntryKind::Reserved);
    assert_eq!(kind_at(&mem, base + 2 * PAGE), EntryKind::Invalid);

    // Read-only shared mappings never write.
    mem.release(&mut alloc).unwrap();
    assert!(inode.writes().is_empty());
}

#[test]
fn interior_unmap_splits_the_region() {
    let machine = Machine::new();
    let mut alloc = machine.alloc();
    let mut mem = UserMemory::create(&machine.mapper, &mut alloc).unwrap();
    let data = pattern(4 * PAGE as usize);
    let inode = RamInode::new(22, data.clone());
    let file = open(&inode, true, false);
    let base = mem
        .mmap(&mut alloc, 3 * PAGE, Protection::read_only(), Sharing::Private, &file, PAGE)
        .unwrap();

    // Unaligned bounds widen to the whole middle page.
    mem.munmap(&mut alloc, base + PAGE + 100, 10).unwrap();
    assert_eq!(mem.regions().len(), 2);
    assert_eq!(file.ref_count(), 3);

    let spans: Vec<_> = mem
        .regions()
        .iter()
        .map(|(_, r)| (r.base(), r.length(), r.file_offset()))
        .collect();
    assert!(spans.contains(&(base, PAGE, PAGE)));
    assert!(spans.contains(&(base + 2 * PAGE, PAGE, 3 * PAGE)));

    let hole = base + PAGE;
    assert_eq!(mem.handle_fault(&mut alloc, hole), Err(FaultError::NotReserved(hole)));
    mem.handle_fault(&mut alloc, base + 2 * PAGE).unwrap();
    assert_eq!(
        read_user(&mem, base + 2 * PAGE, 32),
        data[3 * PAGE as usize..3 * PAGE as usize + 32]
    );

    mem.release(&mut alloc).unwrap();
    assert_eq!(file.ref_count(), 1);
    assert_eq!(machine.in_use(), 0);
}

#[test]
fn one_call_trims_every_overlapping_region() {
    let machine = Machine::new();
    let mut alloc = machine.alloc();
    let mut mem = UserMemory::create(&machine.mapper, &mut alloc).unwrap();
    let a = RamInode::new(23, pattern(2 * PAGE as usize));
    let b = RamInode::new(24, pattern(2 * PAGE as usize));
    let fa = open(&a, true, true);
    let fb = open(&b, true, true);
    let first = mem
        .mmap(&mut alloc, 2 * PAGE, Protection::read_write(), Sharing::Shared, &fa, 0)
        .unwrap();
    let second = mem
        .mmap(&mut alloc, 2 * PAGE, Protection::read_write(), Sharing::Shared, &fb, 0)
        .unwrap();
    assert_eq!(second, first + 2 * PAGE);
    for page in 0..4 {
        mem.handle_fault(&mut alloc, first + page * PAGE).unwrap();
    }

    mem.munmap(&mut alloc, first + PAGE, 2 * PAGE).unwrap();
    assert_eq!(a.writes()[0].offset, PAGE);
    assert_eq!(b.writes()[0].offset, 0);

    let spans: Vec<_> = mem
        .regions()
        .iter()
        .map(|(_, r)| (r.base(), r.length(), r.file_offset()))
        .collect();
    assert_eq!(spans, vec![(first, PAGE, 0), (second + PAGE, PAGE, PAGE)]);

    mem.release(&mut alloc).unwrap();
    assert_eq!(machine.in_use(), 0);
}

#[test]
fn only_backed_pages_are_written() {
    let machine = Machine::new();
    let mut alloc = machine.alloc();
    let mut mem = UserMemory::create(&machine.mapper, &mut alloc).unwrap();
    let inode = RamInode::new(25, pattern(3 * PAGE as usize));
    let file = open(&inode, true, true);
    let base = mem
        .mmap(&mut alloc, 3 * PAGE, Protection::read_write(), Sharing::Shared, &file, 0)
        .unwrap();
    mem.handle_fault(&mut alloc, base + PAGE).unwrap();

    mem.munmap(&mut alloc, base, 3 * PAGE).unwrap();
    let offsets: Vec<_> = inode.writes().iter().map(|w| w.offset).collect();
    assert_eq!(offsets, vec![PAGE, PAGE + 3072]);
    assert!(mem.regions().is_empty());
}

#[test]
fn writeback_error_still_unmaps() {
    let machine = Machine::new();
    let mut alloc = machine.alloc();
    let mut mem = UserMemory::create(&machine.mapper, &mut alloc).unwrap();
    let inode = RamInode::new(26, pattern(2 * PAGE as usize));
    let file = open(&inode, true, true);
    let base = mem
        .mmap(&mut alloc, 2 * PAGE, Protection::read_write(), Sharing::Shared, &file, 0)
        .unwrap();
    mem.handle_fault(&mut alloc, base).unwrap();
    mem.handle_fault(&mut alloc, base + PAGE).unwrap();
    let before = machine.in_use();

    inode.fail_writes();
    assert_eq!(
        mem.munmap(&mut alloc, base, 2 * PAGE),
        Err(MunmapError::Writeback(FsError::Io))
    );
    // Writeback stops at the first error.
    assert_eq!(inode.writes().len(), 1);
    assert_eq!(inode.open_transactions(), 0);
    assert!(mem.regions().is_empty());
    assert_eq!(machine.in_use(), before - 2);
    assert_eq!(file.ref_count(), 1);
}

#[test]
fn full_file_stops_writeback_quietly() {
    let machine = Machine::new();
    let mut alloc = machine.alloc();
    let mut mem = UserMemory::create(&machine.mapper, &mut alloc).unwrap();
    let inode = RamInode::new(27, pattern(PAGE as usize));
    inode.limit_size(PAGE as usize);
    let file = open(&inode, true, true);
    let base = mem
        .mmap(&mut alloc, 2 * PAGE, Protection::read_write(), Sharing::Shared, &file, 0)
        .unwrap();
    mem.handle_fault(&mut alloc, base).unwrap();
    mem.handle_fault(&mut alloc, base + PAGE).unwrap();

    mem.munmap(&mut alloc, base, 2 * PAGE).unwrap();
    let writes = inode.writes();
    assert_eq!(writes.len(), 3);
    assert_eq!(writes[2], WriteRecord { offset: PAGE, len: 3072, written: 0, in_tx: true });
    assert_eq!(inode.contents().len(), PAGE as usize);
    assert!(mem.regions().is_empty());
}

#[test]
fn split_with_a_full_table_changes_nothing() {
    let machine = Machine::new();
    let mut alloc = machine.alloc();
    let mut mem = UserMemory::create(&machine.mapper, &mut alloc).unwrap();
    let inode = RamInode::new(28, pattern(3 * PAGE as usize));
    let file = open(&inode, true, false);
    let base = mem
        .mmap(&mut alloc, 3 * PAGE, Protection::read_only(), Sharing::Private, &file, 0)
        .unwrap();
    mem.handle_fault(&mut alloc, base + PAGE).unwrap();
    for _ in 1..16 {
        mem.mmap(&mut alloc, PAGE, Protection::read_only(), Sharing::Private, &file, 0)
            .unwrap();
    }
    let before = machine.in_use();

    assert_eq!(
        mem.munmap(&mut alloc, base + PAGE, PAGE),
        Err(MunmapError::NoFreeRegion)
    );
    assert_eq!(machine.in_use(), before);
    assert_eq!(mem.regions().len(), 16);
    assert!(mem.space().translate(base + PAGE).is_some());

    // Trimming an end needs no slot.
    mem.munmap(&mut alloc, base, PAGE).unwrap();
    assert_eq!(mem.regions().len(), 16);
    mem.release(&mut alloc).unwrap();
    assert_eq!(machine.in_use(), 0);
}

#[test]
fn empty_and_unmapped_ranges_are_ignored() {
    let machine = Machine::new();
    let mut alloc = machine.alloc();
    let mut mem = UserMemory::create(&machine.mapper, &mut alloc).unwrap();
    let inode = RamInode::new(29, pattern(PAGE as usize));
    let file = open(&inode, true, true);
    let base = mem
        .mmap(&mut alloc, PAGE, Protection::read_write(), Sharing::Shared, &file, 0)
        .unwrap();

    mem.munmap(&mut alloc, base, 0).unwrap();
    mem.munmap(&mut alloc, VirtualAddress::new(0x100_0000), PAGE).unwrap();
    assert_eq!(mem.regions().len(), 1);
    assert_eq!(kind_at(&mem, base), EntryKind::Reserved);

    mem.release(&mut alloc).unwrap();
    assert!(inode.writes().is_empty());
}
