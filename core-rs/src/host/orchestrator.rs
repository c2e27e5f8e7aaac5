//! Provisioning of ephemeral server instances
//!
//! Allocation, staging, transform and configuration run sequentially on
//! the caller's thread. Once the supervisor exists it owns every resource
//! created here; before that, a guard removes whatever was created.

use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::SiteHostConfig;
use crate::errors::{Result, SiteError};
use crate::host::instance::ServerInstance;
use crate::host::options::WebsiteOptions;
use crate::port::PortAllocator;
use crate::siteconfig::{AdminTool, AppCmd, SiteConfigGenerator, SiteDefinition};
use crate::staging::{remove_tree, remove_with_retry, DirectoryRemover, DirectoryStager, RetryPolicy, TreeRemover};
use crate::supervisor::{LaunchCommand, ProcessInspector, ProcessSupervisor, SystemInspector, TeardownPlan};
use crate::transform::{apply_staged_transform, CommandTransformer, ConfigTransformer, NoTransform, TransformOutcome};

/// Directory under the temp root holding generated staged sites
pub const STAGING_DIR_NAME: &str = "sitestage";

/// File name of the generated host configuration
pub const HOST_CONFIG_FILE_NAME: &str = "applicationhost.config";

/// Starts server instances from one configuration
#[derive(Clone)]
pub struct SiteHost {
    config: SiteHostConfig,
    allocator: PortAllocator,
    stager: DirectoryStager,
    generator: SiteConfigGenerator,
    transformer: Arc<dyn ConfigTransformer>,
    inspector: Arc<dyn ProcessInspector>,
    remover: Arc<dyn DirectoryRemover>,
}

impl SiteHost {
    /// Host using the system collaborators named by `config`
    ///
    /// # Errors
    /// `SiteError::RegexError` for an invalid staging pattern
    pub fn new(config: SiteHostConfig) -> Result<Self> {
        let stager = DirectoryStager::new(config.staging.file_policy()?, config.staging.directory_policy());
        let generator = SiteConfigGenerator::new(Arc::new(AppCmd::new(&config.server.admin_tool)));
        let transformer: Arc<dyn ConfigTransformer> = match &config.transform.program {
            Some(program) => Arc::new(CommandTransformer::new(program, config.transform.args.clone())),
            None => Arc::new(NoTransform),
        };

        Ok(Self {
            config,
            allocator: PortAllocator::default(),
            stager,
            generator,
            transformer,
            inspector: Arc::new(SystemInspector),
            remover: Arc::new(TreeRemover),
        })
    }

    pub fn config(&self) -> &SiteHostConfig {
        &self.config
    }

    pub fn with_allocator(mut self, allocator: PortAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn with_admin_tool(mut self, tool: Arc<dyn AdminTool>) -> Self {
        self.generator = SiteConfigGenerator::new(tool);
        self
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn ConfigTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn ProcessInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn with_remover(mut self, remover: Arc<dyn DirectoryRemover>) -> Self {
        self.remover = remover;
        self
    }

    /// Provision and launch an instance on a blocking worker
    ///
    /// # Errors
    /// As [`SiteHost::start_website_blocking`], plus `SiteError::Join` if
    /// the blocking task panicked
    pub async fn start_website(&self, options: WebsiteOptions) -> Result<ServerInstance> {
        let host = self.clone();
        tokio::task::spawn_blocking(move || host.start_website_blocking(options)).await?
    }

    /// Provision and launch an instance
    ///
    /// Returns once the server process has been handed to its launch
    /// worker; the process id may not be known yet.
    ///
    /// # Errors
    /// - `SiteError::Argument` / `SiteError::NotFound` from validation, before any I/O
    /// - `SiteError::NoAvailablePort` if a pool is exhausted
    /// - `SiteError::ResourceConflict` if the staging destination is not empty
    /// - `SiteError::ExternalCommand` from the transform or admin tool
    pub fn start_website_blocking(&self, options: WebsiteOptions) -> Result<ServerInstance> {
        options.validate()?;

        let (http_port, https_port) = self.allocate_ports(&options)?;

        let temp_root = absolute_path(&options.temp_root.clone().unwrap_or_else(std::env::temp_dir))?;
        let token = instance_token(http_port);
        let staged_path = match &options.staged_path {
            Some(path) => absolute_path(path)?,
            None => temp_root.join(STAGING_DIR_NAME).join(&token),
        };
        let config_dir = temp_root.join(format!("{}_{}", STAGING_DIR_NAME, token));
        let temp_config_path = config_dir.join(HOST_CONFIG_FILE_NAME);

        let mut guard = ProvisionGuard {
            staged_path: (!staged_path.exists()).then(|| staged_path.clone()),
            config_dir: Some(config_dir),
            remover: Arc::clone(&self.remover),
            retry: self.config.teardown,
        };

        let copied = self.stager.stage(&options.website_path, &staged_path)?;
        tracing::info!(
            source = %options.website_path.display(),
            staged = %staged_path.display(),
            copied,
            "Staged website"
        );

        if let Some(callback) = &options.on_copied {
            callback.call(&staged_path)?;
        }

        self.transform(&staged_path, options.transform.as_deref())?;

        let site = SiteDefinition::new(
            &self.config.site.name_prefix,
            http_port,
            https_port,
            options.custom_host_name.as_deref(),
            &self.config.site.application_pool,
            &staged_path,
        );
        self.generator
            .generate(&options.template_config, &temp_config_path, &site)?;

        let command = LaunchCommand::new(&self.config.server.executable, &temp_config_path, &site.name, &staged_path)
            .with_environment(options.environment.clone());
        let plan = TeardownPlan::new(&staged_path)
            .with_temp_config(&temp_config_path)
            .owns_config_dir(true)
            .remove_on_exit(options.remove_on_exit)
            .ignore_teardown_errors(options.ignore_teardown_errors)
            .with_retry(self.config.teardown);

        let supervisor = ProcessSupervisor::with_collaborators(
            command,
            plan,
            Arc::clone(&self.inspector),
            Arc::clone(&self.remover),
        );
        guard.disarm();

        // From here the supervisor tears down on error or drop
        supervisor.start()?;

        tracing::info!(
            site = %site.name,
            http_port,
            https_port = ?https_port,
            config = %temp_config_path.display(),
            "Started website"
        );

        Ok(ServerInstance::new(supervisor, site, http_port, https_port, temp_config_path))
    }

    fn allocate_ports(&self, options: &WebsiteOptions) -> Result<(u16, Option<u16>)> {
        let fixed_https: Vec<u16> = options
            .https_port
            .filter(|_| options.https_enabled)
            .into_iter()
            .collect();

        let http_port = match options.http_port {
            Some(port) => port,
            None => self
                .allocator
                .get_available_port(&self.config.ports.http, &fixed_https)?,
        };

        if !options.https_enabled {
            return Ok((http_port, None));
        }

        let https_port = match options.https_port {
            Some(port) => port,
            None => self
                .allocator
                .get_available_port(&self.config.ports.https, &[http_port])?,
        };

        if https_port == http_port {
            return Err(SiteError::Argument(format!(
                "HTTP port and HTTPS port cannot be the same, {}",
                http_port
            )));
        }

        Ok((http_port, Some(https_port)))
    }

    fn transform(&self, staged_path: &Path, name: Option<&str>) -> Result<()> {
        let outcome = apply_staged_transform(
            staged_path,
            &self.config.transform.base_config,
            name,
            self.transformer.as_ref(),
        )?;

        match outcome {
            TransformOutcome::Applied(path) => tracing::info!(path = %path.display(), "Transformed configuration"),
            TransformOutcome::Unchanged if name.is_some() => {
                tracing::warn!(transform = ?name, "Transform produced no output, configuration unchanged")
            }
            TransformOutcome::Unchanged => {}
            TransformOutcome::Skipped(reason) => tracing::debug!(reason = %reason, "Transform skipped"),
        }
        Ok(())
    }
}

/// `path` resolved against the working directory with `.` and `..` folded away
///
/// The server runs with the staged directory as its working directory, and
/// orphan matching compares against absolute executable paths.
fn absolute_path(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

/// `<timestamp>_<uuid>_<port>`, unique per instance
fn instance_token(port: u16) -> String {
    format!(
        "{}_{}_{}",
        Utc::now().format("%Y%m%d%H%M%S%3f"),
        Uuid::new_v4().simple(),
        port
    )
}

/// Removes partially provisioned resources unless disarmed
struct ProvisionGuard {
    /// Only set when staging creates the directory
    staged_path: Option<PathBuf>,
    config_dir: Option<PathBuf>,
    remover: Arc<dyn DirectoryRemover>,
    retry: RetryPolicy,
}

impl ProvisionGuard {
    fn disarm(&mut self) {
        self.staged_path = None;
        self.config_dir = None;
    }
}

impl Drop for ProvisionGuard {
    fn drop(&mut self) {
        if let Some(staged) = self.staged_path.take() {
            if let Err(e) = remove_with_retry(self.remover.as_ref(), &staged, &self.retry) {
                tracing::warn!(path = %staged.display(), error = %e, "Could not remove staged directory after failed start");
            }
        }

        if let Some(dir) = self.config_dir.take() {
            if let Err(e) = remove_tree(&dir) {
                tracing::warn!(path = %dir.display(), error = %e, "Could not remove temp configuration after failed start");
            }
        }
    }
}
