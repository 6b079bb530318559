#![no_std]
#![feature(abi_x86_interrupt)]

extern crate alloc;

pub mod interrupts;
pub mod logging;
pub mod memory;
pub mod qemu;
pub mod report;
pub mod scenario;
#[cfg(feature = "testing")]
pub mod testing;
pub mod uefi;

// Panic handler is defined in each binary (main.rs, tests/*) not in lib

use logging::Logger;
use pt_graft::Engine;

pub use qemu::{QemuExitCode, exit_qemu};

static LOGGER: Logger = Logger;

/// The engine the page-fault trap dispatches to.
pub static ENGINE: Engine = Engine::new();

/// Initialize kernel subsystems. Caller must call uefi::init() first.
///
/// On return boot services are gone, the heap is up, the bootstrap identity
/// map is live in CR3 and the IDT is loaded.
pub fn init() {
    LOGGER.init();
    log::set_logger(&LOGGER).expect("logger already installed");
    log::set_max_level(log::LevelFilter::Debug);

    let memory_map = uefi::exit_boot_services();

    unsafe {
        memory::init_from_uefi(&memory_map);
    }

    interrupts::init();
}
