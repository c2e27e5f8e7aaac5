//! Tree removal with aggregated failures and bounded retries
//!
//! A staged site can stay locked for a moment after its server dies
//! (open handles, virus scanners on Windows). Removal is therefore
//! retried a fixed number of times with a fixed delay between attempts.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use walkdir::WalkDir;

use crate::errors::{Result, SiteError};

/// Default number of removal attempts
pub const DEFAULT_REMOVE_ATTEMPTS: u32 = 10;

/// Default delay between removal attempts
pub const DEFAULT_REMOVE_DELAY_MS: u64 = 200;

/// Bounded retry schedule for tree removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_REMOVE_ATTEMPTS,
            delay_ms: DEFAULT_REMOVE_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay_ms: delay.as_millis() as u64,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Removes a directory tree
pub trait DirectoryRemover: Send + Sync {
    fn remove_all(&self, path: &Path) -> Result<()>;
}

/// Worklist based remover backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeRemover;

impl DirectoryRemover for TreeRemover {
    fn remove_all(&self, path: &Path) -> Result<()> {
        remove_tree(path)
    }
}

/// Remove `path` and everything below it
///
/// Children are removed before their parents. Every failure is collected
/// instead of stopping at the first, so the error names each entry that
/// could not be deleted. A missing `path` is not an error.
pub fn remove_tree(path: &Path) -> Result<()> {
    if fs::symlink_metadata(path).is_err() {
        return Ok(());
    }

    let mut failures: Vec<String> = Vec::new();

    for entry in WalkDir::new(path).follow_links(false).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                failures.push(e.to_string());
                continue;
            }
        };

        let result = if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())
        } else {
            remove_file_clearing_readonly(entry.path())
        };

        if let Err(e) = result {
            failures.push(format!("{}: {}", entry.path().display(), e));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(SiteError::Removal {
            path: path.to_path_buf(),
            attempts: 1,
            failures,
        })
    }
}

fn remove_file_clearing_readonly(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            let mut permissions = fs::symlink_metadata(path)?.permissions();
            if !permissions.readonly() {
                return Err(e);
            }
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            fs::set_permissions(path, permissions)?;
            fs::remove_file(path)
        }
        other => other,
    }
}

/// Remove `path` with `remover`, retrying per `policy`
///
/// # Returns
/// Number of attempts used
///
/// # Errors
/// `SiteError::Removal` carrying the failures of the last attempt once
/// every attempt has failed
pub fn remove_with_retry(remover: &dyn DirectoryRemover, path: &Path, policy: &RetryPolicy) -> Result<u32> {
    let attempts = policy.attempts.max(1);
    let mut last_failures: Vec<String> = Vec::new();

    for attempt in 1..=attempts {
        match remover.remove_all(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), attempt, "Removed directory");
                return Ok(attempt);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), attempt, attempts, error = %e, "Directory removal failed");
                last_failures = match e {
                    SiteError::Removal { failures, .. } => failures,
                    other => vec![other.to_string()],
                };

                if attempt < attempts {
                    thread::sleep(policy.delay());
                }
            }
        }
    }

    Err(SiteError::Removal {
        path: PathBuf::from(path),
        attempts,
        failures: last_failures,
    })
}
