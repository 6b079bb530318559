#![no_main]
#![no_std]

use log::info;
use uefi::{Status, entry};

#[entry]
fn main() -> Status {
    pagefault_kernel::uefi::init();
    pagefault_kernel::init();

    info!("kvm_pagefault01: CVE-2021-38198, fixed by KVM commit b1bd5cba3306");

    pagefault_kernel::scenario::run()
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    use log::error;
    use pt_graft::{BrokenReason, Verdict};

    let file = info.location().map(|l| l.file()).unwrap_or("unknown");
    let line = info.location().map(|l| l.line()).unwrap_or(0);

    error!("PANIC at [{}:{}]:\n{}", file, line, info.message());
    pagefault_kernel::report::finish(Verdict::Broken(BrokenReason::Panic))
}
