//! Fault injection and verdict state machine.
//!
//! ```text
//! Init -> HandlerArmed -> Primed -> Triggered -> Passed | Failed | UnexpectedFault
//! ```
//!
//! Priming reads `cacher1`, writes the value to `writable` and reads
//! `cacher2`. None of these may fault. Triggering writes the value to
//! `readonly`, which must fault on a correct hypervisor. The verdict then
//! comes from the fault handler and never returns to the engine. If the
//! write completes, the engine itself concludes [`Verdict::Fail`].

use core::fmt;
use core::ops::ControlFlow;
use core::sync::atomic::{AtomicU8, Ordering};

use log::{info, warn};
use x86_64::VirtAddr;

use crate::fault::{Disposition, FaultKind, FaultRecord, HandlerTable};
use crate::graft::AliasLayout;
use crate::verdict::{BrokenReason, Verdict};

/// Memory accesses issued by the engine.
///
/// On hardware a faulting access enters the trap handler and the run ends
/// there, so implementations only ever return `Continue`. A simulated guest
/// returns `Break` with the verdict its fault dispatch produced.
pub trait GuestAccess {
    fn read(&mut self, addr: VirtAddr) -> ControlFlow<Verdict, u32>;
    fn write(&mut self, addr: VirtAddr, value: u32) -> ControlFlow<Verdict>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    Init,
    HandlerArmed,
    Primed,
    Triggered,
    Passed,
    Failed,
    UnexpectedFault,
}

impl Stage {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Init,
            1 => Self::HandlerArmed,
            2 => Self::Primed,
            3 => Self::Triggered,
            4 => Self::Passed,
            5 => Self::Failed,
            _ => Self::UnexpectedFault,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::HandlerArmed => "handler armed",
            Self::Primed => "primed",
            Self::Triggered => "triggered",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::UnexpectedFault => "unexpected fault",
        })
    }
}

/// The registered page-fault handler: only a fault on the read-only alias is
/// expected.
fn expect_readonly_fault(fault: &FaultRecord, readonly: VirtAddr) -> Disposition {
    if fault.address == readonly {
        Disposition::Terminate(Verdict::Pass)
    } else {
        Disposition::Fallback
    }
}

/// Owner of the handler table and the current stage.
///
/// The guest keeps one in a static so the trap handler can reach it.
pub struct Engine {
    handlers: HandlerTable,
    stage: AtomicU8,
}

impl Engine {
    pub const fn new() -> Self {
        Self {
            handlers: HandlerTable::new(),
            stage: AtomicU8::new(Stage::Init as u8),
        }
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    pub fn stage(&self) -> Stage {
        Stage::from_u8(self.stage.load(Ordering::SeqCst))
    }

    fn advance(&self, stage: Stage) {
        info!("stage: {stage}");
        self.set_stage(stage);
    }

    fn set_stage(&self, stage: Stage) {
        self.stage.store(stage as u8, Ordering::SeqCst);
    }

    /// Arm the handler, prime, trigger and conclude.
    pub fn run<A: GuestAccess + ?Sized>(&self, layout: &AliasLayout, guest: &mut A) -> Verdict {
        if let Err(err) = self
            .handlers
            .register(FaultKind::PageFault, expect_readonly_fault, layout.readonly)
        {
            return Verdict::Broken(BrokenReason::Registration(err));
        }
        self.advance(Stage::HandlerArmed);

        match self.inject(layout, guest) {
            ControlFlow::Break(verdict) => verdict,
            ControlFlow::Continue(()) => {
                self.advance(Stage::Failed);
                Verdict::Fail
            }
        }
    }

    fn inject<A: GuestAccess + ?Sized>(
        &self,
        layout: &AliasLayout,
        guest: &mut A,
    ) -> ControlFlow<Verdict> {
        info!(
            "priming {:#x} and {:#x}, then writing {:#x}",
            layout.cacher1, layout.cacher2, layout.readonly
        );
        let value = guest.read(layout.cacher1)?;
        guest.write(layout.writable, value)?;
        let value = guest.read(layout.cacher2)?;
        // No logging between the cacher2 read and the trigger.
        self.set_stage(Stage::Primed);
        self.set_stage(Stage::Triggered);
        guest.write(layout.readonly, value)?;

        ControlFlow::Continue(())
    }

    /// Turn a delivered fault into the verdict that ends the run.
    ///
    /// Faults the registered handler does not claim, including every fault
    /// before the handler is armed, are [`BrokenReason::UnexpectedFault`].
    pub fn resolve_fault(&self, fault: &FaultRecord) -> Verdict {
        let stage = self.stage();
        match self.handlers.dispatch(fault) {
            Disposition::Terminate(verdict) => {
                if verdict == Verdict::Pass {
                    self.advance(Stage::Passed);
                }
                verdict
            }
            Disposition::Fallback => {
                warn!(
                    "unclaimed page fault at {:#x} ({:?}) during stage {stage}",
                    fault.address, fault.error_code
                );
                self.advance(Stage::UnexpectedFault);
                Verdict::Broken(BrokenReason::UnexpectedFault {
                    address: fault.address,
                    stage,
                })
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
