//! File and directory exclusion rules applied while staging a site
//!
//! Both policies are ordered rule lists. A file is copied iff no file rule
//! matches it; a directory is skipped entirely (never visited) iff a
//! directory rule matches its name.

use regex::Regex;
use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::errors::Result;

/// Extensions never copied into a staged site
pub const DEFAULT_EXCLUDED_EXTENSIONS: &[&str] = &[".user", ".cs", ".csproj", ".dotSettings", ".suo"];

/// File names never copied into a staged site
pub const DEFAULT_EXCLUDED_FILE_NAMES: &[&str] = &["packages.config"];

/// Directories never visited while staging
pub const DEFAULT_EXCLUDED_DIRECTORIES: &[&str] = &["obj", ".vs", ".git"];

type PathPredicate = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// One file exclusion rule
#[derive(Clone)]
pub enum FileRule {
    /// Case-insensitive extension, stored without the leading dot
    Extension(String),
    /// Case-insensitive exact file name
    FileName(String),
    /// Regular expression matched against the file name
    Pattern(Regex),
    /// Caller supplied predicate over the full source path
    Custom(PathPredicate),
}

impl FileRule {
    pub fn matches(&self, path: &Path) -> bool {
        let name = file_name_lossy(path.file_name());

        match self {
            FileRule::Extension(ext) => file_extension(&name)
                .map(|actual| actual.to_lowercase() == *ext)
                .unwrap_or(false),
            FileRule::FileName(expected) => name.to_lowercase() == *expected,
            FileRule::Pattern(regex) => regex.is_match(&name),
            FileRule::Custom(predicate) => predicate(path),
        }
    }
}

impl fmt::Debug for FileRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileRule::Extension(ext) => f.debug_tuple("Extension").field(ext).finish(),
            FileRule::FileName(name) => f.debug_tuple("FileName").field(name).finish(),
            FileRule::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            FileRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Ordered set of file rules
#[derive(Debug, Clone, Default)]
pub struct FileExclusionPolicy {
    rules: Vec<FileRule>,
}

impl FileExclusionPolicy {
    /// Policy that excludes nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy holding the default extension and file-name rules
    pub fn with_defaults() -> Self {
        let policy = DEFAULT_EXCLUDED_EXTENSIONS
            .iter()
            .fold(Self::new(), |policy, ext| policy.exclude_extension(ext));

        DEFAULT_EXCLUDED_FILE_NAMES
            .iter()
            .fold(policy, |policy, name| policy.exclude_file_name(name))
    }

    /// Exclude files by extension; `".cs"` and `"cs"` are equivalent
    #[must_use]
    pub fn exclude_extension(mut self, extension: &str) -> Self {
        let ext = extension.trim_start_matches('.').to_lowercase();
        self.rules.push(FileRule::Extension(ext));
        self
    }

    #[must_use]
    pub fn exclude_file_name(mut self, name: &str) -> Self {
        self.rules.push(FileRule::FileName(name.to_lowercase()));
        self
    }

    /// Exclude files whose name matches `pattern`
    ///
    /// # Errors
    /// Returns `SiteError::RegexError` if the pattern does not compile
    pub fn exclude_pattern(mut self, pattern: &str) -> Result<Self> {
        self.rules.push(FileRule::Pattern(Regex::new(pattern)?));
        Ok(self)
    }

    #[must_use]
    pub fn exclude_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        self.rules.push(FileRule::Custom(Arc::new(predicate)));
        self
    }

    /// True when any rule matches
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.rules.iter().any(|rule| rule.matches(path))
    }

    pub fn rules(&self) -> &[FileRule] {
        &self.rules
    }
}

/// One directory exclusion rule
#[derive(Clone)]
pub enum DirectoryRule {
    /// Case-insensitive directory name
    Name(String),
    /// Caller supplied predicate over the full source path
    Custom(PathPredicate),
}

impl DirectoryRule {
    pub fn matches(&self, path: &Path) -> bool {
        match self {
            DirectoryRule::Name(expected) => file_name_lossy(path.file_name()).to_lowercase() == *expected,
            DirectoryRule::Custom(predicate) => predicate(path),
        }
    }
}

impl fmt::Debug for DirectoryRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryRule::Name(name) => f.debug_tuple("Name").field(name).finish(),
            DirectoryRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Ordered set of directory rules
#[derive(Debug, Clone, Default)]
pub struct DirectoryExclusionPolicy {
    rules: Vec<DirectoryRule>,
}

impl DirectoryExclusionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        Self::from_names(DEFAULT_EXCLUDED_DIRECTORIES.iter().copied())
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .fold(Self::new(), |policy, name| policy.exclude_name(name.as_ref()))
    }

    #[must_use]
    pub fn exclude_name(mut self, name: &str) -> Self {
        self.rules.push(DirectoryRule::Name(name.to_lowercase()));
        self
    }

    #[must_use]
    pub fn exclude_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        self.rules.push(DirectoryRule::Custom(Arc::new(predicate)));
        self
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.rules.iter().any(|rule| rule.matches(path))
    }

    pub fn rules(&self) -> &[DirectoryRule] {
        &self.rules
    }
}

fn file_name_lossy(name: Option<&OsStr>) -> String {
    name.map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Extension after the last dot, including dot-files such as `.suo`
fn file_extension(name: &str) -> Option<&str> {
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext),
        _ => None,
    }
}
