use log::{debug, info};
use pt_graft::{
    PagingLevels, PagingMemory,
    bootstrap::{self, IDENTITY_LIMIT},
};
use uefi::{
    boot::MemoryType,
    mem::memory_map::{MemoryMap, MemoryMapOwned},
};
use x86_64::{
    PhysAddr,
    registers::control::{Cr0, Cr0Flags, Cr3, Cr4, Cr4Flags},
    structures::paging::{PageTable, PhysFrame},
};

use super::heap;

/// Page tables reached through the identity map.
///
/// Every frame handed to it must lie below [`IDENTITY_LIMIT`], which holds for
/// the UEFI tables before the switch and for anything on the heap after it.
pub struct IdentityMemory {
    root: PhysFrame,
}

impl IdentityMemory {
    /// The hierarchy CR3 currently points at.
    pub fn active() -> Self {
        Self {
            root: Cr3::read().0,
        }
    }
}

impl PagingMemory for IdentityMemory {
    fn root(&self) -> PhysFrame {
        self.root
    }

    fn table(&self, frame: PhysFrame) -> &PageTable {
        unsafe { &*(frame.start_address().as_u64() as *const PageTable) }
    }

    fn table_mut(&mut self, frame: PhysFrame) -> &mut PageTable {
        unsafe { &mut *(frame.start_address().as_u64() as *mut PageTable) }
    }

    fn allocate_region(&mut self, pages: usize) -> Option<PhysFrame> {
        let ptr = heap::allocate_pages(pages)?;
        PhysFrame::from_start_address(PhysAddr::new(ptr as u64)).ok()
    }
}

/// Paging depth selected by the firmware.
pub fn active_levels() -> PagingLevels {
    if Cr4::read().contains(Cr4Flags::L5_PAGING) {
        PagingLevels::Five
    } else {
        PagingLevels::Four
    }
}

/// Replace the firmware's page tables with the bootstrap identity map.
///
/// # Safety
/// The heap must be initialized. Every region the kernel touches from here on
/// must lie below [`IDENTITY_LIMIT`], which this function checks against the
/// memory map.
pub unsafe fn install_bootstrap(memory_map: &MemoryMapOwned) -> PhysFrame {
    for entry in memory_map.entries() {
        let end = entry.phys_start + entry.page_count * 4096;
        if is_ram(entry.ty) && end > IDENTITY_LIMIT {
            panic!(
                "{:?} region {:#x}..{end:#x} lies above the identity limit {IDENTITY_LIMIT:#x}; give the guest less memory",
                entry.ty, entry.phys_start
            );
        }
    }

    let levels = active_levels();
    let mut memory = IdentityMemory::active();
    let root = bootstrap::build(&mut memory, levels)
        .expect("out of memory building the bootstrap identity map");

    unsafe {
        // Grafted pages are user pages, accessed from ring 0.
        Cr4::update(|flags| flags.remove(Cr4Flags::SUPERVISOR_MODE_ACCESS_PREVENTION));
        // Ring 0 writes ignore read-only entries unless WP is set.
        Cr0::update(|flags| flags.insert(Cr0Flags::WRITE_PROTECT));

        let (_, cr3_flags) = Cr3::read();
        Cr3::write(root, cr3_flags);
    }

    info!("bootstrap identity map active, {levels:?} levels");
    debug!("bootstrap root at {:?}", root.start_address());
    root
}

fn is_ram(ty: MemoryType) -> bool {
    !matches!(
        ty,
        MemoryType::RESERVED
            | MemoryType::UNUSABLE
            | MemoryType::MMIO
            | MemoryType::MMIO_PORT_SPACE
    )
}
