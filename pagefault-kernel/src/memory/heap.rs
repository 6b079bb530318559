use core::alloc::Layout;

use linked_list_allocator::LockedHeap;
use log::debug;
use pt_graft::bootstrap::IDENTITY_LIMIT;
use uefi::{
    boot::MemoryType,
    mem::memory_map::{MemoryMap, MemoryMapOwned},
};

/// Largest heap the kernel sets up. Page tables and a handful of log
/// buffers are all that ever live on it.
const HEAP_LIMIT: usize = 16 * 1024 * 1024;

const PAGE_SIZE: usize = 4096;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Put the heap in the largest conventional region that the bootstrap
/// identity map covers. Returns the heap's base and size.
///
/// # Safety
/// Must be called exactly once, after boot services have exited.
pub unsafe fn init_from_uefi(memory_map: &MemoryMapOwned) -> (usize, usize) {
    let mut best_region_base = None;
    let mut best_region_size = 0usize;

    for entry in memory_map.entries() {
        if entry.ty != MemoryType::CONVENTIONAL || entry.phys_start >= IDENTITY_LIMIT {
            continue;
        }

        let end = (entry.phys_start + entry.page_count * PAGE_SIZE as u64).min(IDENTITY_LIMIT);
        let size = (end - entry.phys_start) as usize;
        if size < best_region_size {
            continue;
        }

        best_region_base = Some(entry.phys_start as usize);
        best_region_size = size;
    }

    let best_region_base = best_region_base.expect("no conventional memory below the identity limit");
    let heap_size = best_region_size.min(HEAP_LIMIT);
    debug!(
        "Selected heap: {} pages ({}MB) starting at {:#012X}",
        heap_size / PAGE_SIZE,
        heap_size / (1024 * 1024),
        best_region_base
    );

    unsafe {
        ALLOCATOR.lock().init(best_region_base as *mut u8, heap_size);
    }

    (best_region_base, heap_size)
}

/// Allocate `pages` contiguous, zeroed, page-aligned pages that are never freed.
pub fn allocate_pages(pages: usize) -> Option<*mut u8> {
    if pages == 0 {
        return None;
    }
    let layout = Layout::from_size_align(pages * PAGE_SIZE, PAGE_SIZE).ok()?;
    let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
    (!ptr.is_null()).then_some(ptr)
}
