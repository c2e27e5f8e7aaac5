//! Error types for sitestage

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Resource conflict: {0}")]
    ResourceConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No available port in range {0}")]
    NoAvailablePort(String),

    #[error("External command failed with exit code {exit_code:?}: {command}")]
    ExternalCommand {
        command: String,
        exit_code: Option<i32>,
        output: Vec<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Could not remove '{}' after {attempts} attempt(s): {}", .path.display(), .failures.join("; "))]
    Removal {
        path: PathBuf,
        attempts: u32,
        failures: Vec<String>,
    },

    #[error("Orphan cleanup error: {0}")]
    OrphanCleanup(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    RegexError(String),

    #[error("Background task failed: {0}")]
    Join(String),
}

impl SiteError {
    /// True for errors in the IOError family (copy/delete failures)
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            SiteError::Io(_) | SiteError::IoError(_) | SiteError::Removal { .. }
        )
    }

    /// True for errors in the NotFoundError family
    pub fn is_not_found(&self) -> bool {
        matches!(self, SiteError::NotFound(_) | SiteError::NoAvailablePort(_))
    }
}

impl From<regex::Error> for SiteError {
    fn from(err: regex::Error) -> Self {
        SiteError::RegexError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SiteError {
    fn from(err: tokio::task::JoinError) -> Self {
        SiteError::Join(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SiteError>;
