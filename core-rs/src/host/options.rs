//! Per-call options for starting a website

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{Result, SiteError};

type CopiedFn = dyn Fn(&Path) -> Result<()> + Send + Sync;

/// Hook run on the staged directory before transform and configuration
#[derive(Clone)]
pub struct CopiedCallback(Arc<CopiedFn>);

impl CopiedCallback {
    pub fn call(&self, staged_path: &Path) -> Result<()> {
        (self.0)(staged_path)
    }
}

impl fmt::Debug for CopiedCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CopiedCallback(..)")
    }
}

/// What to serve and how
///
/// Only `website_path` and `template_config` are required. Ports left unset
/// are allocated from the configured pools.
#[derive(Debug, Clone)]
pub struct WebsiteOptions {
    pub website_path: PathBuf,
    pub template_config: PathBuf,
    /// Environment name selecting `Web.<name>.config`
    pub transform: Option<String>,
    pub http_port: Option<u16>,
    pub https_port: Option<u16>,
    pub https_enabled: bool,
    pub custom_host_name: Option<String>,
    pub environment: BTreeMap<String, String>,
    /// Staging destination; generated under `temp_root` when unset
    pub staged_path: Option<PathBuf>,
    /// Root for generated paths; the OS temp directory when unset
    pub temp_root: Option<PathBuf>,
    pub remove_on_exit: bool,
    pub ignore_teardown_errors: bool,
    pub on_copied: Option<CopiedCallback>,
}

impl WebsiteOptions {
    pub fn new<W: Into<PathBuf>, T: Into<PathBuf>>(website_path: W, template_config: T) -> Self {
        Self {
            website_path: website_path.into(),
            template_config: template_config.into(),
            transform: None,
            http_port: None,
            https_port: None,
            https_enabled: false,
            custom_host_name: None,
            environment: BTreeMap::new(),
            staged_path: None,
            temp_root: None,
            remove_on_exit: true,
            ignore_teardown_errors: false,
            on_copied: None,
        }
    }

    pub fn transform(mut self, name: &str) -> Self {
        self.transform = Some(name.to_string());
        self
    }

    pub fn http_port(mut self, port: u16) -> Self {
        self.http_port = Some(port);
        self
    }

    /// Enable https, optionally on a fixed port
    pub fn https(mut self, port: Option<u16>) -> Self {
        self.https_enabled = true;
        self.https_port = port;
        self
    }

    pub fn host_name(mut self, name: &str) -> Self {
        self.custom_host_name = Some(name.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.environment.insert(key.to_string(), value.to_string());
        self
    }

    pub fn staged_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.staged_path = Some(path.into());
        self
    }

    pub fn temp_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.temp_root = Some(path.into());
        self
    }

    pub fn remove_on_exit(mut self, remove: bool) -> Self {
        self.remove_on_exit = remove;
        self
    }

    pub fn ignore_teardown_errors(mut self, ignore: bool) -> Self {
        self.ignore_teardown_errors = ignore;
        self
    }

    pub fn on_copied<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Path) -> Result<()> + Send + Sync + 'static,
    {
        self.on_copied = Some(CopiedCallback(Arc::new(callback)));
        self
    }

    /// Check the options without touching the filesystem beyond reads
    ///
    /// # Errors
    /// - `SiteError::Argument` if http and https are fixed to the same port
    /// - `SiteError::NotFound` if the website directory or template is missing
    pub fn validate(&self) -> Result<()> {
        if let (Some(http), Some(https), true) = (self.http_port, self.https_port, self.https_enabled) {
            if http == https {
                return Err(SiteError::Argument(format!(
                    "HTTP port and HTTPS port cannot be the same, {}",
                    http
                )));
            }
        }

        if !self.website_path.is_dir() {
            return Err(SiteError::NotFound(format!(
                "Website directory does not exist: {}",
                self.website_path.display()
            )));
        }

        if !self.template_config.is_file() {
            return Err(SiteError::NotFound(format!(
                "Host configuration template does not exist: {}",
                self.template_config.display()
            )));
        }

        Ok(())
    }
}
