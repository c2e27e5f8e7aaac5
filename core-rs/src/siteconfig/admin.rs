//! Admin tool used to mutate a host configuration file

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::errors::Result;
use crate::exec::{self, CapturedOutput};

/// Runs one admin command to completion
pub trait AdminTool: Send + Sync {
    /// Run with `args`; a non-zero exit must surface as `SiteError::ExternalCommand`
    fn run(&self, args: &[String]) -> Result<CapturedOutput>;
}

/// `appcmd`-compatible admin executable
#[derive(Debug, Clone)]
pub struct AppCmd {
    executable: PathBuf,
}

impl AppCmd {
    pub fn new<P: Into<PathBuf>>(executable: P) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl AdminTool for AppCmd {
    fn run(&self, args: &[String]) -> Result<CapturedOutput> {
        let description = exec::describe(self.executable.as_os_str(), args);
        let mut command = Command::new(&self.executable);
        command.args(args);

        if let Some(dir) = self.executable.parent().filter(|p| !p.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        exec::run_captured(&mut command, &description)
    }
}
