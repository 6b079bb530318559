//! Memory management.
//!
//! Everything is identity mapped below 2 GiB:
//! - the heap, for page tables the kernel builds
//! - the bootstrap hierarchy that replaces the firmware's page tables

mod heap;
mod identity;

use uefi::mem::memory_map::MemoryMapOwned;

pub use heap::allocate_pages;
pub use identity::{IdentityMemory, active_levels, install_bootstrap};

/// Initialize memory subsystem from the final UEFI memory map.
///
/// # Safety
/// Must be called exactly once during kernel initialization, after boot
/// services have exited.
pub unsafe fn init_from_uefi(memory_map: &MemoryMapOwned) {
    unsafe {
        heap::init_from_uefi(memory_map);
        install_bootstrap(memory_map);
    }
}
