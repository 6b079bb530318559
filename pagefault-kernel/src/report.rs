//! Printing the verdict and leaving QEMU.

use pt_graft::Verdict;

use crate::{QemuExitCode, exit_qemu, println};

impl From<&Verdict> for QemuExitCode {
    fn from(verdict: &Verdict) -> Self {
        match verdict {
            Verdict::Pass => QemuExitCode::Success,
            Verdict::Fail => QemuExitCode::Failed,
            Verdict::Broken(_) => QemuExitCode::Broken,
        }
    }
}

/// Print exactly one result line and exit.
pub fn finish(verdict: Verdict) -> ! {
    println!("[{}] {}", verdict.tag(), verdict);
    exit_qemu(QemuExitCode::from(&verdict))
}
