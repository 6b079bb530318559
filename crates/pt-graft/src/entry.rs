//! Checked accessors for paging-structure entries.
//!
//! Permission bits of a non-present entry are ignored by the MMU, so reading
//! them back as booleans would be meaningless. The accessors here return
//! `None` for those instead.

use x86_64::structures::paging::{PageTableFlags, PhysFrame, page_table::PageTableEntry};

/// Access rights granted by one entry on the translation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub writable: bool,
    pub user: bool,
}

impl Permissions {
    /// Writable and user accessible.
    pub const READ_WRITE: Self = Self {
        writable: true,
        user: true,
    };

    /// User accessible, writes denied.
    pub const READ_ONLY: Self = Self {
        writable: false,
        user: true,
    };

    /// Flags for a present entry granting these permissions.
    pub fn flags(self) -> PageTableFlags {
        let mut flags = PageTableFlags::PRESENT;
        if self.writable {
            flags |= PageTableFlags::WRITABLE;
        }
        if self.user {
            flags |= PageTableFlags::USER_ACCESSIBLE;
        }
        flags
    }
}

/// Why an entry cannot be followed to a lower-level table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextTableError {
    /// The present bit is clear.
    NotPresent,
    /// The entry maps a large page instead of a table.
    HugePage,
}

pub trait EntryExt {
    fn is_present(&self) -> bool;

    /// `None` if the entry is not present.
    fn writable(&self) -> Option<bool>;

    /// `None` if the entry is not present.
    fn user_accessible(&self) -> Option<bool>;

    /// Frame of the table this entry references.
    fn next_table(&self) -> Result<PhysFrame, NextTableError>;

    /// Point this entry at the table or page in `frame`.
    fn link(&mut self, frame: PhysFrame, permissions: Permissions);
}

impl EntryExt for PageTableEntry {
    fn is_present(&self) -> bool {
        self.flags().contains(PageTableFlags::PRESENT)
    }

    fn writable(&self) -> Option<bool> {
        self.is_present()
            .then(|| self.flags().contains(PageTableFlags::WRITABLE))
    }

    fn user_accessible(&self) -> Option<bool> {
        self.is_present()
            .then(|| self.flags().contains(PageTableFlags::USER_ACCESSIBLE))
    }

    fn next_table(&self) -> Result<PhysFrame, NextTableError> {
        if !self.is_present() {
            return Err(NextTableError::NotPresent);
        }
        if self.flags().contains(PageTableFlags::HUGE_PAGE) {
            return Err(NextTableError::HugePage);
        }
        Ok(PhysFrame::containing_address(self.addr()))
    }

    fn link(&mut self, frame: PhysFrame, permissions: Permissions) {
        self.set_frame(frame, permissions.flags());
    }
}
