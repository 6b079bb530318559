//! Host-side setup for the page-fault probe.
//!
//! The probe only exercises the hypervisor's software (shadow) MMU, so
//! two-dimensional paging (AMD NPT, Intel EPT) has to be off while the guest
//! runs. [`disable_tdp`] reloads whichever KVM vendor module has it enabled
//! and checks the parameter afterwards.

use std::env;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};

pub mod loader;
pub mod sysfs;

pub use loader::{ModuleLoader, Modprobe};
pub use sysfs::ModuleParam;

/// Where sysfs exposes module parameters.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/module";

/// Overrides [`DEFAULT_SYSFS_ROOT`].
pub const SYSFS_ROOT_ENV: &str = "PAGEFAULT_SYSFS_ROOT";

/// Two-dimensional paging switches of the KVM vendor modules.
pub const TDP_SWITCHES: [ModuleParam; 2] = [
    ModuleParam::new("kvm_amd", "npt"),
    ModuleParam::new("kvm_intel", "ept"),
];

/// The TDP MMU can hide the bug even with two-dimensional paging off.
pub const TDP_MMU: ModuleParam = ModuleParam::new("kvm", "tdp_mmu");

#[derive(Debug, Error)]
pub enum TdpError {
    /// A parameter file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    /// A parameter holds something other than a kernel boolean.
    #[error("{} holds {value:?}, expected Y/N/1/0", path.display())]
    Parse { path: PathBuf, value: String },
    /// The loader could not be started.
    #[error("failed to run modprobe for {module}: {source}")]
    Spawn { module: String, source: io::Error },
    /// The loader ran and reported failure.
    #[error("failed to {action} {module} (exit code {code:?})")]
    Module {
        module: String,
        action: &'static str,
        code: Option<i32>,
    },
    /// The module came back with the parameter still on, or not at all.
    #[error("{module}.{parameter} is {value:?} after reload, expected Some(false)")]
    StillEnabled {
        module: &'static str,
        parameter: &'static str,
        value: Option<bool>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TdpConfig {
    pub sysfs_root: PathBuf,
    /// Parameters to force off, one module each.
    pub switches: Vec<ModuleParam>,
    /// Parameter that only triggers the false-negative warning.
    pub tdp_mmu: ModuleParam,
}

impl TdpConfig {
    /// Defaults, with the sysfs root taken from [`SYSFS_ROOT_ENV`] if set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(root) = env::var_os(SYSFS_ROOT_ENV) {
            config.sysfs_root = PathBuf::from(root);
        }
        config
    }
}

impl Default for TdpConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            switches: TDP_SWITCHES.to_vec(),
            tdp_mmu: TDP_MMU,
        }
    }
}

/// What [`disable_tdp`] changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TdpReport {
    /// Modules reloaded with their switch off.
    pub reloaded: Vec<&'static str>,
    /// The TDP MMU is on; a PASS may be a false negative.
    pub tdp_mmu: bool,
}

/// Force every switch in `config` off, reloading modules through `loader`.
pub fn disable_tdp<L: ModuleLoader + ?Sized>(
    config: &TdpConfig,
    loader: &mut L,
) -> Result<TdpReport, TdpError> {
    let root = config.sysfs_root.as_path();
    let mut report = TdpReport::default();

    for switch in &config.switches {
        match switch.read(root)? {
            Some(true) => {
                info!(
                    "reloading {} with {}=0",
                    switch.module, switch.parameter
                );
                loader.unload(switch.module)?;
                loader.load(switch.module, &[format!("{}=0", switch.parameter)])?;

                let value = switch.read(root)?;
                if value != Some(false) {
                    return Err(TdpError::StillEnabled {
                        module: switch.module,
                        parameter: switch.parameter,
                        value,
                    });
                }
                report.reloaded.push(switch.module);
            }
            Some(false) => debug!("{}.{} already off", switch.module, switch.parameter),
            None => debug!("{} not loaded", switch.module),
        }
    }

    if config.tdp_mmu.read(root)? == Some(true) {
        warn!("tdp_mmu is enabled, beware of false negatives");
        report.tdp_mmu = true;
    }

    Ok(report)
}
