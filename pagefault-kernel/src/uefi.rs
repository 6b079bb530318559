use ::uefi::mem::memory_map::MemoryMapOwned;

/// Initialize UEFI helpers. Call this before using other UEFI functions.
pub fn init() {
    ::uefi::helpers::init().expect("failed to initialize UEFI helpers");
}

/// Exit UEFI boot services and return the final memory map.
///
/// After this, UEFI boot services are unavailable and the firmware's page
/// tables are ours to replace.
pub fn exit_boot_services() -> MemoryMapOwned {
    unsafe { ::uefi::boot::exit_boot_services(None) }
}
