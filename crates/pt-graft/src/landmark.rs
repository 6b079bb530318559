//! Locating the branch point left behind by the bootstrap.

use log::debug;
use x86_64::{VirtAddr, structures::paging::PhysFrame};

use crate::entry::{EntryExt, NextTableError};
use crate::graft::GraftError;
use crate::memory::{PagingLevels, PagingMemory, slot_size};

/// Level the branch point must sit at, so each of its slots spans 1 GiB.
pub const LANDMARK_LEVEL: u8 = 3;

/// Slots of the branch point and whether the bootstrap leaves them present.
const EXPECTED_SHAPE: [(usize, bool); 3] = [(0, true), (1, true), (2, false)];

/// The first table in the hierarchy with more than one child.
#[derive(Debug, PartialEq, Eq)]
pub struct Landmark {
    table: PhysFrame,
    level: u8,
    base: VirtAddr,
}

impl Landmark {
    /// Walk down from the root through slot 0 until slot 1 of a table is present.
    ///
    /// The branch point is then checked against the shape the bootstrap is
    /// expected to leave, instead of trusting its position alone.
    pub fn locate<M: PagingMemory>(memory: &M, levels: PagingLevels) -> Result<Self, GraftError> {
        let mut table = memory.root();
        let mut level = levels.root_level();

        while !memory.table(table)[1].is_present() {
            if level == 1 {
                return Err(GraftError::NoBranchPoint { level });
            }

            table = memory.table(table)[0]
                .next_table()
                .map_err(|err| match err {
                    NextTableError::NotPresent => GraftError::NoBranchPoint { level },
                    NextTableError::HugePage => GraftError::HugeEntry { level },
                })?;
            level -= 1;
            debug!("descended to level {level} table at {:?}", table.start_address());
        }

        if level != LANDMARK_LEVEL {
            return Err(GraftError::UnexpectedLevel { level });
        }

        let entries = memory.table(table);
        for (slot, expected_present) in EXPECTED_SHAPE {
            if entries[slot].is_present() != expected_present {
                return Err(GraftError::LandmarkShape {
                    slot,
                    expected_present,
                });
            }
        }

        debug!("branch point at level {level}, table {:?}", table.start_address());

        // Only slot 0 is followed on the way down.
        Ok(Self {
            table,
            level,
            base: VirtAddr::zero(),
        })
    }

    pub fn table(&self) -> PhysFrame {
        self.table
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// First address translated through `slot` of the branch point.
    pub fn slot_address(&self, slot: usize) -> VirtAddr {
        self.base + slot as u64 * slot_size(self.level)
    }
}
