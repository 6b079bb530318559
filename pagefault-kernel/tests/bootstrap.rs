#![no_std]
#![no_main]

extern crate alloc;

use alloc::boxed::Box;

use pagefault_kernel::memory::{self, IdentityMemory};
use pt_graft::{EntryExt, Landmark, PagingMemory, bootstrap::IDENTITY_LIMIT};
use x86_64::{VirtAddr, registers::control::Cr3, structures::paging::PageTableFlags};

pagefault_kernel::test_harness!(
    landmark_is_the_pdpt,
    graft_slots_are_free,
    heap_lies_in_the_identity_map,
    stack_lies_in_the_identity_map,
    identity_map_uses_large_pages
);

fn landmark_is_the_pdpt() {
    let memory = IdentityMemory::active();
    let landmark = Landmark::locate(&memory, memory::active_levels()).unwrap();

    assert_eq!(landmark.level(), 3);
    assert_eq!(landmark.slot_address(4), VirtAddr::new(0x1_0000_0000));
    assert_eq!(landmark.slot_address(5), VirtAddr::new(0x1_4000_0000));
}

fn graft_slots_are_free() {
    let memory = IdentityMemory::active();
    let landmark = Landmark::locate(&memory, memory::active_levels()).unwrap();
    let pdpt = memory.table(landmark.table());

    assert!(!pdpt[4].is_present());
    assert!(!pdpt[5].is_present());
}

fn heap_lies_in_the_identity_map() {
    let boxed = Box::new(0xfeed_u64);
    let addr = &*boxed as *const u64 as u64;
    assert!(addr < IDENTITY_LIMIT);

    let pages = memory::allocate_pages(5).unwrap();
    assert_eq!(pages as u64 % 4096, 0);
    assert!(pages as u64 + 5 * 4096 <= IDENTITY_LIMIT);
    let contents = unsafe { core::slice::from_raw_parts(pages, 5 * 4096) };
    assert!(contents.iter().all(|byte| *byte == 0));
}

fn stack_lies_in_the_identity_map() {
    let local = 0u64;
    assert!((&local as *const u64 as u64) < IDENTITY_LIMIT);
}

fn identity_map_uses_large_pages() {
    let memory = IdentityMemory::active();
    assert_eq!(memory.root(), Cr3::read().0);

    let landmark = Landmark::locate(&memory, memory::active_levels()).unwrap();
    let pdpt = memory.table(landmark.table());
    let high = memory.table(pdpt[1].next_table().unwrap());

    // 1 GiB + 6 MiB lives in the fourth 2 MiB page of the second directory.
    assert_eq!(high[3].addr().as_u64(), 0x4060_0000);
    assert!(high[3].flags().contains(PageTableFlags::HUGE_PAGE));
    assert_eq!(high[3].writable(), Some(true));
}
