/**
 * config.rs
 * Site host configuration (YAML format)
 *
 * Format:
 * ```yaml
 * server:
 *   executable: C:\Program Files (x86)\IIS Express\iisexpress.exe
 *   adminTool: C:\Program Files (x86)\IIS Express\appcmd.exe
 * ports:
 *   http: { start: 45000, count: 100 }
 *   https: { start: 44300, count: 99 }
 * site:
 *   namePrefix: SiteStage
 *   applicationPool: Clr4IntegratedAppPool
 * staging:
 *   excludedExtensions: [.user, .cs]
 *   excludedFileNames: [packages.config]
 *   excludedPatterns: ['^.*\.pdb$']
 *   excludedDirectories: [obj, .vs, .git]
 * teardown:
 *   attempts: 10
 *   delayMs: 200
 * transform:
 *   program: ctt.exe
 *   args: []
 *   baseConfig: Web.config
 * ```
 *
 * Every section and field is optional; missing values take the defaults.
 */

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{Result, SiteError};
use crate::port::PortPoolRange;
use crate::siteconfig::{DEFAULT_APPLICATION_POOL, DEFAULT_SITE_NAME_PREFIX};
use crate::staging::{
    DirectoryExclusionPolicy, FileExclusionPolicy, RetryPolicy, DEFAULT_EXCLUDED_DIRECTORIES,
    DEFAULT_EXCLUDED_EXTENSIONS, DEFAULT_EXCLUDED_FILE_NAMES,
};
use crate::transform::DEFAULT_BASE_CONFIG;

/// Default http pool, 45000..=45100
pub const DEFAULT_HTTP_POOL: (u16, u16) = (45000, 100);

/// Default https pool, 44300..=44399
pub const DEFAULT_HTTPS_POOL: (u16, u16) = (44300, 99);

/// Top level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteHostConfig {
    pub server: ServerConfig,
    pub ports: PortsConfig,
    pub site: SiteConfig,
    pub staging: StagingConfig,
    pub teardown: RetryPolicy,
    pub transform: TransformConfig,
}

/// Server and admin tool executables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub executable: PathBuf,
    pub admin_tool: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let dir = default_install_dir();
        Self {
            executable: dir.join(exe_name("iisexpress")),
            admin_tool: dir.join(exe_name("appcmd")),
        }
    }
}

/// IIS Express install directory; empty (PATH lookup) off Windows
fn default_install_dir() -> PathBuf {
    if cfg!(windows) {
        let program_files = std::env::var_os("ProgramFiles(x86)")
            .or_else(|| std::env::var_os("ProgramFiles"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Program Files (x86)"));
        program_files.join("IIS Express")
    } else {
        PathBuf::new()
    }
}

fn exe_name(stem: &str) -> String {
    format!("{}{}", stem, std::env::consts::EXE_SUFFIX)
}

/// Port pools scanned when no explicit port is given
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PortsConfig {
    pub http: PortPoolRange,
    pub https: PortPoolRange,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            http: pool(DEFAULT_HTTP_POOL),
            https: pool(DEFAULT_HTTPS_POOL),
        }
    }
}

fn pool((start, count): (u16, u16)) -> PortPoolRange {
    // Both defaults end well below 65535
    PortPoolRange::new(u32::from(start), u32::from(count)).unwrap_or_else(|_| PortPoolRange::single(start))
}

/// Site naming and application pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteConfig {
    pub name_prefix: String,
    pub application_pool: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_SITE_NAME_PREFIX.to_string(),
            application_pool: DEFAULT_APPLICATION_POOL.to_string(),
        }
    }
}

/// Exclusion rules used when staging
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StagingConfig {
    pub excluded_extensions: Vec<String>,
    pub excluded_file_names: Vec<String>,
    pub excluded_patterns: Vec<String>,
    pub excluded_directories: Vec<String>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        fn owned(values: &[&str]) -> Vec<String> {
            values.iter().map(|v| v.to_string()).collect()
        }

        Self {
            excluded_extensions: owned(DEFAULT_EXCLUDED_EXTENSIONS),
            excluded_file_names: owned(DEFAULT_EXCLUDED_FILE_NAMES),
            excluded_patterns: Vec::new(),
            excluded_directories: owned(DEFAULT_EXCLUDED_DIRECTORIES),
        }
    }
}

impl StagingConfig {
    /// Build the file policy
    ///
    /// # Errors
    /// `SiteError::RegexError` for an invalid pattern
    pub fn file_policy(&self) -> Result<FileExclusionPolicy> {
        let mut policy = FileExclusionPolicy::new();
        for extension in &self.excluded_extensions {
            policy = policy.exclude_extension(extension);
        }
        for name in &self.excluded_file_names {
            policy = policy.exclude_file_name(name);
        }
        for pattern in &self.excluded_patterns {
            policy = policy.exclude_pattern(pattern)?;
        }
        Ok(policy)
    }

    pub fn directory_policy(&self) -> DirectoryExclusionPolicy {
        DirectoryExclusionPolicy::from_names(&self.excluded_directories)
    }
}

/// External transform program
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformConfig {
    /// Transforms are skipped when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
    pub base_config: String,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            base_config: DEFAULT_BASE_CONFIG.to_string(),
        }
    }
}

impl SiteHostConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// - `SiteError::NotFound` if the file does not exist
    /// - `SiteError::Yaml` if it cannot be parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SiteError::NotFound(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded site host configuration");
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
