//! Single-slot fault handler registration.
//!
//! The trap dispatcher consults the table synchronously on every fault. The
//! table starts empty, is filled once and is never cleared; the run ends
//! before unregistering would matter.

use spinning_top::Spinlock;
use thiserror::Error;
use x86_64::{VirtAddr, structures::idt::PageFaultErrorCode};

use crate::verdict::Verdict;

/// Exception classes a handler can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    PageFault,
}

/// A fault as delivered by the CPU: CR2 and the pushed error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultRecord {
    pub address: VirtAddr,
    pub error_code: PageFaultErrorCode,
}

impl FaultRecord {
    pub fn new(address: VirtAddr, error_code: PageFaultErrorCode) -> Self {
        Self {
            address,
            error_code,
        }
    }

    pub fn kind(&self) -> FaultKind {
        FaultKind::PageFault
    }

    pub fn is_write(&self) -> bool {
        self.error_code.contains(PageFaultErrorCode::CAUSED_BY_WRITE)
    }
}

/// What the dispatcher should do after a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The fault was expected; report the verdict and end the run.
    Terminate(Verdict),
    /// Not handled; fall back to the default (fatal) fault handling.
    Fallback,
}

/// Handler invoked with the fault and the context value it was registered with.
pub type FaultHandler = fn(&FaultRecord, VirtAddr) -> Disposition;

#[derive(Clone, Copy)]
struct Registration {
    kind: FaultKind,
    handler: FaultHandler,
    context: VirtAddr,
}

/// A handler is already registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a {kind:?} handler is already registered")]
pub struct RegistrationError {
    pub kind: FaultKind,
}

pub struct HandlerTable {
    slot: Spinlock<Option<Registration>>,
}

impl HandlerTable {
    pub const fn new() -> Self {
        Self {
            slot: Spinlock::new(None),
        }
    }

    /// Bind `handler` and its `context` to `kind`. Only one registration is
    /// ever accepted.
    pub fn register(
        &self,
        kind: FaultKind,
        handler: FaultHandler,
        context: VirtAddr,
    ) -> Result<(), RegistrationError> {
        let mut slot = self.slot.lock();
        if let Some(existing) = *slot {
            return Err(RegistrationError {
                kind: existing.kind,
            });
        }
        *slot = Some(Registration {
            kind,
            handler,
            context,
        });
        Ok(())
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Run the handler registered for the fault's kind, if any.
    pub fn dispatch(&self, fault: &FaultRecord) -> Disposition {
        // Copy the registration out so the handler runs without the lock held.
        let registration = *self.slot.lock();
        match registration {
            Some(registration) if registration.kind == fault.kind() => {
                (registration.handler)(fault, registration.context)
            }
            _ => Disposition::Fallback,
        }
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}
