//! Loading and unloading kernel modules.

use std::process::Command;

use tracing::debug;

use crate::TdpError;

/// Reloads kernel modules with new parameters.
pub trait ModuleLoader {
    fn unload(&mut self, module: &str) -> Result<(), TdpError>;
    fn load(&mut self, module: &str, args: &[String]) -> Result<(), TdpError>;
}

/// Shells out to `modprobe`.
#[derive(Debug, Default)]
pub struct Modprobe;

impl Modprobe {
    fn run(action: &'static str, module: &str, command: &mut Command) -> Result<(), TdpError> {
        debug!("running {command:?}");
        let status = command.status().map_err(|source| TdpError::Spawn {
            module: module.to_owned(),
            source,
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(TdpError::Module {
                module: module.to_owned(),
                action,
                code: status.code(),
            })
        }
    }
}

impl ModuleLoader for Modprobe {
    fn unload(&mut self, module: &str) -> Result<(), TdpError> {
        Self::run("unload", module, Command::new("modprobe").arg("-r").arg(module))
    }

    fn load(&mut self, module: &str, args: &[String]) -> Result<(), TdpError> {
        Self::run("load", module, Command::new("modprobe").arg(module).args(args))
    }
}
