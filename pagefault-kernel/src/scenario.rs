//! The probe against the live page tables.

use core::ops::ControlFlow;

use pt_graft::{GuestAccess, PagingRegisters, Verdict};
use x86_64::{
    VirtAddr,
    registers::control::{Cr0, Cr4, Efer},
};

use crate::{ENGINE, memory::IdentityMemory, report};

/// Current values of the registers [`pt_graft::probe`] looks at.
pub fn paging_registers() -> PagingRegisters {
    PagingRegisters {
        cr0: Cr0::read(),
        cr4: Cr4::read(),
        efer: Efer::read(),
    }
}

// A faulting access traps straight into the IDT, so these never break.
impl GuestAccess for IdentityMemory {
    fn read(&mut self, addr: VirtAddr) -> ControlFlow<Verdict, u32> {
        ControlFlow::Continue(unsafe { core::ptr::read_volatile(addr.as_ptr::<u32>()) })
    }

    fn write(&mut self, addr: VirtAddr, value: u32) -> ControlFlow<Verdict> {
        unsafe { core::ptr::write_volatile(addr.as_mut_ptr::<u32>(), value) };
        ControlFlow::Continue(())
    }
}

/// Probe, graft, prime and trigger, then report.
///
/// On a correct hypervisor the final write traps and the page-fault handler
/// reports PASS, so this only returns through [`report::finish`].
pub fn run() -> ! {
    let mut memory = IdentityMemory::active();
    let verdict = pt_graft::run(&ENGINE, paging_registers(), &mut memory);
    report::finish(verdict)
}
