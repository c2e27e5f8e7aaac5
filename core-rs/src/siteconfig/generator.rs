//! Per-instance host configuration generation
//!
//! The template is copied verbatim to a fresh file, then the site is
//! registered in it with one admin invocation per structural element.
//! Each invocation appends; running the sequence twice against the same
//! file duplicates entries, so every instance gets its own file.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::errors::{Result, SiteError};
use crate::siteconfig::admin::AdminTool;
use crate::siteconfig::binding::SiteDefinition;

const SITES_SECTION: &str = "-section:system.applicationHost/sites";
const COMMIT_APPHOST: &str = "/commit:apphost";

/// Argument lists for registering `site` in `config_file`, in execution order
///
/// 1. site entry
/// 2. http binding, then https binding when present
/// 3. application pool on the root path
/// 4. physical path of the root virtual directory
pub fn site_commands(site: &SiteDefinition, config_file: &Path) -> Vec<Vec<String>> {
    let selector = site.selector();

    let mut mutations = vec![format!("/+{}", selector)];

    for binding in &site.bindings {
        mutations.push(format!(
            "/+{}.bindings.[protocol='{}',bindingInformation='{}']",
            selector,
            binding.protocol,
            binding.binding_information()
        ));
    }

    mutations.push(format!(
        "/+{}.[path='/',applicationPool='{}']",
        selector, site.application_pool
    ));
    mutations.push(format!(
        "/+{}.[path='/'].[path='/',physicalPath='{}']",
        selector,
        site.physical_path.display()
    ));

    let app_host_config = format!("/AppHostConfig:{}", config_file.display());

    mutations
        .into_iter()
        .map(|mutation| {
            vec![
                "set".to_string(),
                "config".to_string(),
                SITES_SECTION.to_string(),
                mutation,
                COMMIT_APPHOST.to_string(),
                app_host_config.clone(),
            ]
        })
        .collect()
}

/// Writes host configuration files through an [`AdminTool`]
#[derive(Clone)]
pub struct SiteConfigGenerator {
    tool: Arc<dyn AdminTool>,
}

impl SiteConfigGenerator {
    pub fn new(tool: Arc<dyn AdminTool>) -> Self {
        Self { tool }
    }

    /// Copy `template` to `target` and register `site` in it
    ///
    /// # Errors
    /// - `SiteError::NotFound` if the template is missing
    /// - `SiteError::ResourceConflict` if `target` already exists
    /// - `SiteError::ExternalCommand` from the first failing admin command
    pub fn generate(&self, template: &Path, target: &Path, site: &SiteDefinition) -> Result<()> {
        self.prepare(template, target)?;
        self.register_site(target, site)
    }

    /// Copy `template` verbatim to the fresh path `target`
    pub fn prepare(&self, template: &Path, target: &Path) -> Result<()> {
        if !template.is_file() {
            return Err(SiteError::NotFound(format!(
                "Host configuration template does not exist: {}",
                template.display()
            )));
        }

        if target.exists() {
            return Err(SiteError::ResourceConflict(format!(
                "Host configuration file already exists: {}",
                target.display()
            )));
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::copy(template, target).map_err(|e| {
            SiteError::IoError(format!(
                "Failed to copy template '{}' to '{}': {}",
                template.display(),
                target.display(),
                e
            ))
        })?;

        tracing::debug!(template = %template.display(), target = %target.display(), "Copied host configuration template");
        Ok(())
    }

    /// Run the registration sequence against an existing configuration file
    ///
    /// Stops at the first failing command; entries added before it stay.
    pub fn register_site(&self, config_file: &Path, site: &SiteDefinition) -> Result<()> {
        for args in site_commands(site, config_file) {
            self.tool.run(&args)?;
        }

        tracing::info!(
            site = %site.name,
            config = %config_file.display(),
            bindings = site.bindings.len(),
            "Registered site in host configuration"
        );
        Ok(())
    }
}
