//! Adversarial page-table construction for probing shadow-MMU write enforcement.
//!
//! A hypervisor running its guests on a software (shadow) MMU caches the
//! translation of guest paging structures. When two guest page-table entries
//! with different write permissions point at the *same* lower-level table,
//! the cached shadow of that table must not carry the permissions of whichever
//! path happened to be walked first (CVE-2021-38198).
//!
//! This crate builds that aliasing layout on top of an inherited hierarchy and
//! drives the access sequence that exposes the stale permission:
//!
//! 1. [`probe`] checks that 64-bit long-mode paging is active.
//! 2. [`Landmark::locate`] finds the branch point left by the bootstrap and
//!    [`Landmark::graft`] attaches a writable and a read-only path to one shared
//!    page directory.
//! 3. [`Engine::run`] arms the page-fault handler, primes the shadow structures
//!    and writes to the read-only alias, turning the outcome into a [`Verdict`].
//!
//! Everything touching real hardware sits behind [`PagingMemory`] and
//! [`GuestAccess`], so the protocol runs the same in the guest kernel and
//! against the simulated MMU used by the unit tests.

#![no_std]

#[cfg(test)]
extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod bootstrap;
pub mod engine;
pub mod entry;
pub mod fault;
pub mod graft;
pub mod landmark;
pub mod memory;
pub mod probe;
pub mod verdict;

#[cfg(test)]
mod sim;

pub use engine::{Engine, GuestAccess, Stage};
pub use entry::{EntryExt, Permissions};
pub use fault::{Disposition, FaultHandler, FaultKind, FaultRecord, HandlerTable, RegistrationError};
pub use graft::{AliasLayout, GraftError};
pub use landmark::Landmark;
pub use memory::{PagingLevels, PagingMemory};
pub use probe::{PagingRegisters, ProbeError, probe};
pub use verdict::{BrokenReason, Verdict};

use log::info;

/// Run the whole protocol once: probe, locate, graft, prime and trigger.
///
/// Nothing is registered with the engine's handler table unless the probe,
/// landmark discovery and graft all succeed.
pub fn run<G>(engine: &Engine, registers: PagingRegisters, guest: &mut G) -> Verdict
where
    G: PagingMemory + GuestAccess,
{
    let levels = match probe(registers) {
        Ok(levels) => levels,
        Err(err) => return Verdict::Broken(BrokenReason::Probe(err)),
    };
    info!("{levels:?} paging active");

    let layout = match Landmark::locate(&*guest, levels).and_then(|landmark| landmark.graft(guest)) {
        Ok(layout) => layout,
        Err(err) => return Verdict::Broken(BrokenReason::Graft(err)),
    };

    engine.run(&layout, guest)
}
