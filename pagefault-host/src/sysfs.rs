//! Boolean kernel module parameters under `/sys/module`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::TdpError;

/// One boolean parameter of one kernel module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleParam {
    pub module: &'static str,
    pub parameter: &'static str,
}

impl ModuleParam {
    pub const fn new(module: &'static str, parameter: &'static str) -> Self {
        Self { module, parameter }
    }

    /// `<root>/<module>/parameters/<parameter>`
    pub fn path(&self, root: &Path) -> PathBuf {
        root.join(self.module).join("parameters").join(self.parameter)
    }

    /// Current value, or `None` if the module is not loaded.
    pub fn read(&self, root: &Path) -> Result<Option<bool>, TdpError> {
        let path = self.path(root);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(TdpError::Read { path, source }),
        };

        match contents.trim() {
            "Y" | "y" | "1" => Ok(Some(true)),
            "N" | "n" | "0" => Ok(Some(false)),
            other => Err(TdpError::Parse {
                path,
                value: other.to_owned(),
            }),
        }
    }
}
