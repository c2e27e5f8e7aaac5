//! Synchronous external command execution with captured output

use std::ffi::OsStr;
use std::process::{Command, Output, Stdio};

use crate::errors::{Result, SiteError};

/// Output of a finished command, split into lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub exit_code: Option<i32>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout lines followed by stderr lines
    pub fn all_lines(&self) -> Vec<String> {
        self.stdout.iter().chain(self.stderr.iter()).cloned().collect()
    }
}

/// Render a program and its arguments the way it is logged and reported
pub fn describe<S: AsRef<OsStr>>(program: &OsStr, args: &[S]) -> String {
    let mut rendered = format!("'{}'", program.to_string_lossy());
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.as_ref().to_string_lossy());
    }
    rendered
}

/// Run `command` to completion and return its raw output
///
/// Output lines are logged; the returned bytes are untouched.
///
/// # Errors
/// - `SiteError::NotFound` if the program does not exist
/// - `SiteError::Process` if it cannot be spawned for another reason
/// - `SiteError::ExternalCommand` if it exits with a non-zero code
pub fn run_raw(command: &mut Command, description: &str) -> Result<Output> {
    tracing::debug!(command = %description, "Executing");

    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                SiteError::NotFound(format!("Executable not found for {}: {}", description, e))
            }
            _ => SiteError::Process(format!("Failed to run {}: {}", description, e)),
        })?;

    let stdout = split_lines(&output.stdout);
    let stderr = split_lines(&output.stderr);
    for line in &stdout {
        tracing::debug!(target: "sitestage::exec", "{}", line);
    }
    for line in &stderr {
        tracing::warn!(target: "sitestage::exec", "{}", line);
    }

    if output.status.code() != Some(0) {
        return Err(SiteError::ExternalCommand {
            command: description.to_string(),
            exit_code: output.status.code(),
            output: stdout.into_iter().chain(stderr).collect(),
        });
    }

    Ok(output)
}

/// Run `command` to completion with its output split into lines
///
/// # Errors
/// As [`run_raw`]
pub fn run_captured(command: &mut Command, description: &str) -> Result<CapturedOutput> {
    let output = run_raw(command, description)?;
    Ok(CapturedOutput {
        exit_code: output.status.code(),
        stdout: split_lines(&output.stdout),
        stderr: split_lines(&output.stderr),
    })
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(|line| line.to_string())
        .collect()
}
