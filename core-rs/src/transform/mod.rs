//! Environment-specific configuration transforms
//!
//! The transform algorithm itself belongs to an external tool. This module
//! owns everything around it: locating the base and transform files inside
//! the staged site, handing the tool a scratch copy, writing the result back
//! over the staged base file, and deleting the scratch copy on every path.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::errors::{Result, SiteError};
use crate::exec;

/// Default base configuration file name inside a staged site
pub const DEFAULT_BASE_CONFIG: &str = "Web.config";

/// Applies a transform file to a base configuration file
pub trait ConfigTransformer: Send + Sync {
    /// Return the transformed content, or `None` to leave the base file untouched
    fn apply(&self, base_config: &Path, transform: &Path) -> Result<Option<Vec<u8>>>;
}

/// Transformer that never changes anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransform;

impl ConfigTransformer for NoTransform {
    fn apply(&self, _base_config: &Path, _transform: &Path) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Runs `program args... <base> <transform>` and takes stdout, byte for byte, as the result
#[derive(Debug, Clone)]
pub struct CommandTransformer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandTransformer {
    pub fn new<P: Into<PathBuf>>(program: P, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl ConfigTransformer for CommandTransformer {
    fn apply(&self, base_config: &Path, transform: &Path) -> Result<Option<Vec<u8>>> {
        let mut args: Vec<String> = self.args.clone();
        args.push(base_config.to_string_lossy().into_owned());
        args.push(transform.to_string_lossy().into_owned());

        let description = exec::describe(self.program.as_os_str(), &args);
        let mut command = Command::new(&self.program);
        command.args(&args);

        let output = exec::run_raw(&mut command, &description)?;
        if output.stdout.is_empty() {
            return Ok(None);
        }
        Ok(Some(output.stdout))
    }
}

/// What happened to the staged base configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    /// No transform requested or a file was missing
    Skipped(String),
    /// The transformer returned nothing
    Unchanged,
    /// Transformed content was written to this path
    Applied(PathBuf),
}

/// Transform file path for `base`, e.g. `Web.config` + `Release` -> `Web.Release.config`
pub fn transform_file_path(base: &Path, name: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let file_name = match base.extension() {
        Some(ext) => format!("{}.{}.{}", stem, name, ext.to_string_lossy()),
        None => format!("{}.{}", stem, name),
    };

    base.with_file_name(file_name)
}

/// Scratch copy removed when dropped
struct ScratchFile {
    path: PathBuf,
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Could not delete transform scratch file");
            }
        }
    }
}

/// Apply the named transform to the base configuration inside `staged_dir`
///
/// # Arguments
/// * `staged_dir` - Staged website root
/// * `base_config_name` - Base file name relative to `staged_dir`
/// * `transform_name` - Environment name such as `Release`; `None` or blank skips
/// * `transformer` - External collaborator performing the transform
///
/// # Errors
/// Errors from the transformer or from writing the result. The scratch copy is
/// deleted in both the success and the failure case.
pub fn apply_staged_transform(
    staged_dir: &Path,
    base_config_name: &str,
    transform_name: Option<&str>,
    transformer: &dyn ConfigTransformer,
) -> Result<TransformOutcome> {
    let name = match transform_name.map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => return Ok(TransformOutcome::Skipped("no transform specified".to_string())),
    };

    let base = staged_dir.join(base_config_name);
    if !base.is_file() {
        tracing::debug!(path = %base.display(), "Base configuration missing, transform skipped");
        return Ok(TransformOutcome::Skipped(format!("{} does not exist", base.display())));
    }

    let transform = transform_file_path(&base, name);
    if !transform.is_file() {
        tracing::debug!(path = %transform.display(), "Transform file missing, transform skipped");
        return Ok(TransformOutcome::Skipped(format!("{} does not exist", transform.display())));
    }

    let scratch = ScratchFile {
        path: base.with_file_name(format!(
            ".{}.{}.original",
            base_config_name.replace(['/', '\\'], "_"),
            uuid::Uuid::new_v4().simple()
        )),
    };
    fs::copy(&base, &scratch.path).map_err(|e| {
        SiteError::IoError(format!("Failed to copy {} for transform: {}", base.display(), e))
    })?;

    tracing::info!(
        base = %base.display(),
        transform = %transform.display(),
        "Applying configuration transform"
    );

    match transformer.apply(&scratch.path, &transform)? {
        Some(content) => {
            fs::write(&base, content)?;
            Ok(TransformOutcome::Applied(base))
        }
        None => Ok(TransformOutcome::Unchanged),
    }
}
