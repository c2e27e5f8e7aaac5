//! Filtered copy of a website tree into an isolated staging directory

use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use crate::errors::{Result, SiteError};
use crate::staging::exclusion::{DirectoryExclusionPolicy, FileExclusionPolicy};

/// Copies source trees with a fixed pair of exclusion policies
#[derive(Debug, Clone, Default)]
pub struct DirectoryStager {
    files: FileExclusionPolicy,
    directories: DirectoryExclusionPolicy,
}

impl DirectoryStager {
    pub fn new(files: FileExclusionPolicy, directories: DirectoryExclusionPolicy) -> Self {
        Self { files, directories }
    }

    /// Stager with the default website exclusions
    pub fn with_defaults() -> Self {
        Self::new(
            FileExclusionPolicy::with_defaults(),
            DirectoryExclusionPolicy::with_defaults(),
        )
    }

    pub fn stage(&self, source: &Path, destination: &Path) -> Result<usize> {
        stage(source, destination, &self.files, &self.directories)
    }
}

/// Copy `source` into `destination`, skipping excluded files and directories
///
/// # Arguments
/// * `source` - Existing directory to copy from
/// * `destination` - Must be missing or empty
/// * `files` - A file is copied iff no rule matches
/// * `directories` - A matching directory is never visited
///
/// # Returns
/// Count of created directories (including `destination` when it was
/// created here) plus copied files
///
/// # Errors
/// - `SiteError::NotFound` if `source` is not an existing directory
/// - `SiteError::ResourceConflict` if `destination` already has entries
/// - I/O errors on the first failed copy, leaving a partial destination
pub fn stage(
    source: &Path,
    destination: &Path,
    files: &FileExclusionPolicy,
    directories: &DirectoryExclusionPolicy,
) -> Result<usize> {
    if !source.is_dir() {
        return Err(SiteError::NotFound(format!(
            "Source directory does not exist or could not be found: {}",
            source.display()
        )));
    }

    let mut copied_items = 0;

    if destination.exists() {
        ensure_empty_directory(destination)?;
    } else {
        fs::create_dir_all(destination)?;
        copied_items += 1;
    }

    // Files sort ahead of subdirectories so each level is copied before descending
    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(true)
        .sort_by(files_first)
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && directories.is_excluded(entry.path())));

    for entry in walker {
        let entry = entry.map_err(|e| SiteError::IoError(format!("Failed to walk {}: {}", source.display(), e)))?;

        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| SiteError::IoError(format!("Failed to resolve {}: {}", entry.path().display(), e)))?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            tracing::trace!(from = %entry.path().display(), to = %target.display(), "Copying directory");
            fs::create_dir(&target)?;
            copied_items += 1;
            continue;
        }

        if files.is_excluded(entry.path()) {
            tracing::trace!(path = %entry.path().display(), "Excluded file");
            continue;
        }

        tracing::trace!(from = %entry.path().display(), to = %target.display(), "Copying file");
        fs::copy(entry.path(), &target).map_err(|e| {
            SiteError::IoError(format!(
                "Failed to copy '{}' to '{}': {}",
                entry.path().display(),
                target.display(),
                e
            ))
        })?;
        copied_items += 1;
    }

    tracing::debug!(
        source = %source.display(),
        destination = %destination.display(),
        copied_items,
        "Staged directory"
    );

    Ok(copied_items)
}

fn files_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

fn ensure_empty_directory(destination: &Path) -> Result<()> {
    if !destination.is_dir() {
        return Err(SiteError::ResourceConflict(format!(
            "The path '{}' exists and is not a directory",
            destination.display()
        )));
    }

    let mut file_count = 0;
    let mut directory_count = 0;
    for entry in fs::read_dir(destination)? {
        if entry?.file_type()?.is_dir() {
            directory_count += 1;
        } else {
            file_count += 1;
        }
    }

    if file_count + directory_count > 0 {
        return Err(SiteError::ResourceConflict(format!(
            "The directory '{}' cannot be used as a target folder since there are {} files and {} folders in the folder",
            destination.display(),
            file_count,
            directory_count
        )));
    }

    Ok(())
}
