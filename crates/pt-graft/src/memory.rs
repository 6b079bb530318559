//! Access to the guest's paging structures.

use x86_64::structures::paging::{PageTable, PhysFrame};

/// Size of a 4 KiB page.
pub const PAGE_SIZE: u64 = 4096;

/// Number of entries in every paging structure.
pub const ENTRY_COUNT: usize = 512;

/// Depth of the active translation hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingLevels {
    /// PML4 root, 48-bit linear addresses.
    Four,
    /// PML5 root (CR4.LA57), 57-bit linear addresses.
    Five,
}

impl PagingLevels {
    /// Level number of the table CR3 points at.
    pub fn root_level(self) -> u8 {
        match self {
            Self::Four => 4,
            Self::Five => 5,
        }
    }
}

/// Bytes of linear address space covered by one entry of a table at `level`.
///
/// Level 1 is the page table, so its entries cover a single page.
pub const fn slot_size(level: u8) -> u64 {
    PAGE_SIZE << (9 * (level as u32 - 1))
}

/// Page tables of the running guest.
///
/// Frames handed out by [`allocate_region`](Self::allocate_region) and every
/// table reachable from [`root`](Self::root) must be accessible through
/// [`table`](Self::table) and [`table_mut`](Self::table_mut).
pub trait PagingMemory {
    /// Frame holding the root table (the CR3 target).
    fn root(&self) -> PhysFrame;

    /// Table stored in `frame`.
    fn table(&self, frame: PhysFrame) -> &PageTable;

    /// Mutable access to the table stored in `frame`.
    fn table_mut(&mut self, frame: PhysFrame) -> &mut PageTable;

    /// Allocate `pages` physically contiguous, page-aligned frames.
    ///
    /// The region is never returned. Contents are unspecified; callers zero it.
    fn allocate_region(&mut self, pages: usize) -> Option<PhysFrame>;
}
