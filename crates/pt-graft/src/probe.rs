//! Paging-mode precondition check.

use thiserror::Error;
use x86_64::registers::{
    control::{Cr0Flags, Cr4Flags},
    model_specific::EferFlags,
};

use crate::memory::PagingLevels;

/// Snapshot of the registers that select the paging mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingRegisters {
    pub cr0: Cr0Flags,
    pub cr4: Cr4Flags,
    pub efer: EferFlags,
}

impl PagingRegisters {
    /// Register state of a 4-level long-mode guest.
    pub fn long_mode() -> Self {
        Self {
            cr0: Cr0Flags::PROTECTED_MODE_ENABLE | Cr0Flags::PAGING,
            cr4: Cr4Flags::PHYSICAL_ADDRESS_EXTENSION,
            efer: EferFlags::LONG_MODE_ENABLE | EferFlags::LONG_MODE_ACTIVE,
        }
    }
}

/// The guest is not in a paging mode the graft can be built in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// CR0.PG is clear.
    #[error("paging is disabled")]
    PagingDisabled,
    /// Paging is on but EFER.LMA is clear (32-bit or PAE paging).
    #[error("bootstrap did not enable 64bit paging (pae: {pae})")]
    NotLongMode { pae: bool },
}

/// Check that 64-bit paging is active and report its depth.
pub fn probe(registers: PagingRegisters) -> Result<PagingLevels, ProbeError> {
    if !registers.cr0.contains(Cr0Flags::PAGING) {
        return Err(ProbeError::PagingDisabled);
    }

    if !registers.efer.contains(EferFlags::LONG_MODE_ACTIVE) {
        return Err(ProbeError::NotLongMode {
            pae: registers
                .cr4
                .contains(Cr4Flags::PHYSICAL_ADDRESS_EXTENSION),
        });
    }

    if registers.cr4.contains(Cr4Flags::L5_PAGING) {
        Ok(PagingLevels::Five)
    } else {
        Ok(PagingLevels::Four)
    }
}
