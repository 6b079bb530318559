//! Initial identity map with the branch point [`Landmark::locate`] expects.
//!
//! The layout below the root is:
//!
//! ```text
//! PDPT[0]  0x0000_0000 - 0x3fff_ffff  identity mapped (2 MiB pages)
//! PDPT[1]  0x4000_0000 - 0x7fff_ffff  identity mapped (2 MiB pages)
//! PDPT[2]  0x8000_0000 - 0xbfff_ffff  not present
//! PDPT[3]  0xc000_0000 - 0xffff_ffff  only the last 2 MiB identity mapped
//! ```
//!
//! Every level above the PDPT has exactly one present entry, at index 0, so the
//! PDPT is the first table with more than one child.
//!
//! [`Landmark::locate`]: crate::Landmark::locate

use log::debug;
use x86_64::{
    PhysAddr,
    structures::paging::{PageTableFlags, PhysFrame},
};

use crate::memory::{ENTRY_COUNT, PagingLevels, PagingMemory, slot_size};

/// Physical memory the bootstrap identity maps in full.
pub const IDENTITY_LIMIT: u64 = 2 * slot_size(3);

const TABLE_FLAGS: PageTableFlags = PageTableFlags::PRESENT.union(PageTableFlags::WRITABLE);
const LARGE_PAGE_FLAGS: PageTableFlags = TABLE_FLAGS.union(PageTableFlags::HUGE_PAGE);

/// Build the bootstrap hierarchy and return its root frame.
///
/// Returns `None` if a table frame cannot be allocated. The caller is
/// responsible for loading the root into CR3.
pub fn build<M: PagingMemory>(memory: &mut M, levels: PagingLevels) -> Option<PhysFrame> {
    let pdpt = new_table(memory)?;

    for slot in 0..2u64 {
        let pd = new_table(memory)?;
        let base = slot * slot_size(3);
        for (index, entry) in memory.table_mut(pd).iter_mut().enumerate() {
            entry.set_addr(
                PhysAddr::new(base + index as u64 * slot_size(2)),
                LARGE_PAGE_FLAGS,
            );
        }
        memory.table_mut(pdpt)[slot as usize].set_frame(pd, TABLE_FLAGS);
    }

    let top = new_table(memory)?;
    let last = ENTRY_COUNT - 1;
    memory.table_mut(top)[last].set_addr(
        PhysAddr::new(4 * slot_size(3) - slot_size(2)),
        LARGE_PAGE_FLAGS,
    );
    memory.table_mut(pdpt)[3].set_frame(top, TABLE_FLAGS);

    let mut root = pdpt;
    for level in 4..=levels.root_level() {
        let parent = new_table(memory)?;
        memory.table_mut(parent)[0].set_frame(root, TABLE_FLAGS);
        debug!("bootstrap level {level} table at {:?}", parent.start_address());
        root = parent;
    }

    Some(root)
}

fn new_table<M: PagingMemory>(memory: &mut M) -> Option<PhysFrame> {
    let frame = memory.allocate_region(1)?;
    memory.table_mut(frame).zero();
    Some(frame)
}
