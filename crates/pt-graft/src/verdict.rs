//! Categorical outcome of a run.

use core::fmt;

use thiserror::Error;
use x86_64::VirtAddr;

use crate::engine::Stage;
use crate::fault::RegistrationError;
use crate::graft::GraftError;
use crate::probe::ProbeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The write through the read-only alias faulted at the right address.
    Pass,
    /// The write through the read-only alias went through.
    Fail,
    /// The environment did not allow the test to run to a conclusion.
    Broken(BrokenReason),
}

impl Verdict {
    /// Short result tag for the console.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Broken(_) => "BROK",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("hypervisor correctly enforced write permission"),
            Self::Fail => f.write_str("write to read-only address did not fault"),
            Self::Broken(reason) => fmt::Display::fmt(reason, f),
        }
    }
}

/// Why a run ended in [`Verdict::Broken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BrokenReason {
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Graft(#[from] GraftError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    /// A fault the registered handler did not claim.
    #[error("unexpected page fault at {address:#x} (stage: {stage})")]
    UnexpectedFault { address: VirtAddr, stage: Stage },
    /// The kernel panicked; details were logged before reporting.
    #[error("kernel panic")]
    Panic,
}
