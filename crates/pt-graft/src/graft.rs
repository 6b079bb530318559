//! Grafting the two permission domains onto the branch point.
//!
//! Both domains share one page directory:
//!
//! ```text
//! landmark[4] (RW) --+
//!                    +--> PD --[0] (RO)--> PT1 --[0] (RW)--> data page 3
//! landmark[5] (RO) --+       --[1] (RW)--> PT2 --[0] (RW)--> data page 4
//! ```
//!
//! The write permission differs only at the branch point. A shadow MMU that
//! caches the directory with the permissions inherited through slot 4 and
//! reuses that cached copy for slot 5 lets writes through the read-only alias.

use log::debug;
use thiserror::Error;
use x86_64::{VirtAddr, structures::paging::PhysFrame};

use crate::entry::{EntryExt, Permissions};
use crate::landmark::Landmark;
use crate::memory::{PagingMemory, slot_size};

/// Branch point slot of the writable domain.
pub const WRITABLE_SLOT: usize = 4;

/// Branch point slot of the read-only domain.
pub const READONLY_SLOT: usize = 5;

/// Three table pages plus two data pages.
pub const REGION_PAGES: usize = 5;

/// The inherited hierarchy does not allow the graft to be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GraftError {
    /// Slot 0 at `level` is not present and no table branches above it.
    #[error("no branching page table found, level {level} ends the chain")]
    NoBranchPoint { level: u8 },
    /// Slot 0 at `level` maps a large page instead of a table.
    #[error("large page mapped at level {level} above the branch point")]
    HugeEntry { level: u8 },
    /// The first branching table is not a page directory pointer table.
    #[error("branch point found at level {level}, expected level 3")]
    UnexpectedLevel { level: u8 },
    /// A branch point slot differs from the bootstrap's layout.
    #[error("branch point slot {slot} present bit is not {expected_present}")]
    LandmarkShape { slot: usize, expected_present: bool },
    /// A graft slot is already in use.
    #[error("branch point slot {slot} is already mapped")]
    SlotOccupied { slot: usize },
    /// The page region could not be allocated.
    #[error("failed to allocate {pages} pages")]
    RegionAllocation { pages: usize },
}

/// Addresses produced by the graft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasLayout {
    /// Read through the writable domain to prime the shared page directory.
    pub cacher1: VirtAddr,
    /// Data page 4 through the writable domain.
    pub writable: VirtAddr,
    /// Read through the read-only domain to link it to the primed directory.
    pub cacher2: VirtAddr,
    /// Data page 4 through the read-only domain. Writes must fault.
    pub readonly: VirtAddr,
    /// First frame of the five grafted pages.
    pub region: PhysFrame,
}

impl Landmark {
    /// Allocate the region and link both permission domains into the branch point.
    ///
    /// Consumes the landmark. Running the graft a second time on the same
    /// hierarchy fails with [`GraftError::SlotOccupied`] before anything is
    /// allocated.
    pub fn graft<M: PagingMemory>(self, memory: &mut M) -> Result<AliasLayout, GraftError> {
        let branch = memory.table(self.table());
        for slot in [WRITABLE_SLOT, READONLY_SLOT] {
            if branch[slot].is_present() {
                return Err(GraftError::SlotOccupied { slot });
            }
        }

        let region = memory
            .allocate_region(REGION_PAGES)
            .ok_or(GraftError::RegionAllocation {
                pages: REGION_PAGES,
            })?;
        for page in 0..REGION_PAGES as u64 {
            memory.table_mut(region + page).zero();
        }

        let directory = region;
        let cacher_table = region + 1;
        let target_table = region + 2;
        let cacher_data = region + 3;
        let target_data = region + 4;

        memory.table_mut(cacher_table)[0].link(cacher_data, Permissions::READ_WRITE);
        memory.table_mut(target_table)[0].link(target_data, Permissions::READ_WRITE);

        let directory_entries = memory.table_mut(directory);
        directory_entries[0].link(cacher_table, Permissions::READ_ONLY);
        directory_entries[1].link(target_table, Permissions::READ_WRITE);

        let branch = memory.table_mut(self.table());
        branch[WRITABLE_SLOT].link(directory, Permissions::READ_WRITE);
        branch[READONLY_SLOT].link(directory, Permissions::READ_ONLY);
        debug!(
            "grafted directory {:?} into slots {WRITABLE_SLOT} and {READONLY_SLOT}",
            directory.start_address()
        );

        // Cacher and target sit under different directory slots.
        let target_offset = slot_size(self.level() - 1);
        let writable_base = self.slot_address(WRITABLE_SLOT);
        let readonly_base = self.slot_address(READONLY_SLOT);

        Ok(AliasLayout {
            cacher1: writable_base,
            writable: writable_base + target_offset,
            cacher2: readonly_base,
            readonly: readonly_base + target_offset,
            region,
        })
    }
}
