//! OS process table access for orphan cleanup and kills

use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

use crate::errors::{Result, SiteError};

/// One row of the process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub exe: Option<PathBuf>,
    pub exited: bool,
}

/// Lists and kills OS processes
pub trait ProcessInspector: Send + Sync {
    fn processes(&self) -> Result<Vec<ProcessEntry>>;

    /// Kill `pid`; `Ok(false)` when it was already gone
    fn kill(&self, pid: u32) -> Result<bool>;
}

/// Process table backed by `sysinfo`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInspector;

fn has_exited(status: ProcessStatus) -> bool {
    matches!(status, ProcessStatus::Zombie | ProcessStatus::Dead)
}

impl ProcessInspector for SystemInspector {
    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All);

        Ok(sys
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                exe: process.exe().map(Path::to_path_buf),
                exited: has_exited(process.status()),
            })
            .collect())
    }

    fn kill(&self, pid: u32) -> Result<bool> {
        let target = Pid::from_u32(pid);
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[target]));

        let process = match sys.process(target) {
            Some(process) if !has_exited(process.status()) => process,
            _ => return Ok(false),
        };

        if process.kill() {
            Ok(true)
        } else {
            Err(SiteError::Process(format!("Failed to kill process {}", pid)))
        }
    }
}

/// Entries still running from an executable under `staged_path`
///
/// Matching is a case-insensitive substring test on the executable path.
/// A path without a root matches nothing. `own_pid` is never returned.
pub fn find_orphans(entries: &[ProcessEntry], staged_path: &Path, own_pid: u32) -> Vec<ProcessEntry> {
    if !staged_path.has_root() {
        return Vec::new();
    }
    let needle = staged_path.to_string_lossy().to_lowercase();

    entries
        .iter()
        .filter(|entry| entry.pid != own_pid && !entry.exited)
        .filter(|entry| {
            entry
                .exe
                .as_ref()
                .map(|exe| exe.to_string_lossy().to_lowercase().contains(&needle))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}
