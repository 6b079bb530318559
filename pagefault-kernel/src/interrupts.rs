use core::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, error};
use pt_graft::{FaultRecord, Verdict};
use spinning_top::RwSpinlock;
use x86_64::{
    instructions::interrupts,
    registers::control::Cr2,
    structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode},
};

use crate::{ENGINE, report};

static BREAKPOINT_INTERRUPT_COUNT: AtomicUsize = AtomicUsize::new(0);

pub use x86_64::structures::idt::PageFaultHandlerFunc;

static DESCRIPTOR_TABLE: RwSpinlock<InterruptDescriptorTable> =
    RwSpinlock::new(InterruptDescriptorTable::new());

/// Set a custom page fault handler. Pass `None` to restore the default handler,
/// which hands every fault to [`ENGINE`](crate::ENGINE).
pub fn set_page_fault_handler(handler: Option<PageFaultHandlerFunc>) {
    let mut descriptor_table = DESCRIPTOR_TABLE.write();
    let handler = handler.unwrap_or(default_page_fault_handler);
    descriptor_table.page_fault.set_handler_fn(handler);
    drop(descriptor_table);
}

/// Load the IDT. Only exceptions are delivered; IRQs stay masked.
pub fn init() {
    interrupts::disable();

    let mut descriptor_table = DESCRIPTOR_TABLE.write();

    // 3 = 0x03
    descriptor_table.breakpoint.set_handler_fn(breakpoint_handler);

    // 6 = 0x06
    descriptor_table
        .invalid_opcode
        .set_handler_fn(invalid_opcode_handler);

    // 8 = 0x08
    descriptor_table
        .double_fault
        .set_handler_fn(double_fault_handler);

    // 13 = 0x0D
    descriptor_table
        .general_protection_fault
        .set_handler_fn(gpf_handler);

    // 14 = 0x0E
    descriptor_table
        .page_fault
        .set_handler_fn(default_page_fault_handler);

    drop(descriptor_table);

    unsafe {
        (*DESCRIPTOR_TABLE.data_ptr()).load();
    }

    interrupts::int3();
    let breakpoint_count = BREAKPOINT_INTERRUPT_COUNT.load(Ordering::SeqCst);
    assert_eq!(breakpoint_count, 1, "did not receive breakpoint interrupt");
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    debug!("BREAKPOINT: {stack_frame:?}");
    BREAKPOINT_INTERRUPT_COUNT.fetch_add(1, Ordering::Relaxed);
}

extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    panic!("Invalid opcode: {stack_frame:?}");
}

extern "x86-interrupt" fn gpf_handler(stack_frame: InterruptStackFrame, error_code: u64) {
    panic!("General protection fault: error code {error_code}\n{stack_frame:?}");
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) -> ! {
    panic!("Double fault: error code {error_code}\n{stack_frame:?}");
}

/// Every page fault ends the run, one way or another.
extern "x86-interrupt" fn default_page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    let fault_address =
        Cr2::read().expect("CR2 contained non-canonical address while handling page fault");

    let fault = FaultRecord::new(fault_address, error_code);
    let verdict = ENGINE.resolve_fault(&fault);

    if let Verdict::Broken(_) = verdict {
        error!(
            "Page fault:\n  Fault address:   {fault_address:#020x}\n  Current address: {:#020x}\n  Stack pointer:   {:#020x}\n  Caused by {} ({error_code:?})",
            stack_frame.instruction_pointer,
            stack_frame.stack_pointer,
            if fault.is_write() { "write" } else { "read" },
        );
    }

    report::finish(verdict);
}
