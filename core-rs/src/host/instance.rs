//! Handle to a running server instance

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::siteconfig::{Protocol, SiteDefinition};
use crate::supervisor::{ExitRecord, LaunchCommand, LaunchOutcome, ProcessSupervisor, SupervisorState};

/// One provisioned server; dropping it tears everything down
#[derive(Debug)]
pub struct ServerInstance {
    supervisor: ProcessSupervisor,
    site: SiteDefinition,
    http_port: u16,
    https_port: Option<u16>,
    staged_path: PathBuf,
    temp_config_path: PathBuf,
}

/// Serializable view of an instance
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub site_name: String,
    pub site_id: u32,
    pub process_id: Option<u32>,
    pub state: SupervisorState,
    pub http_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https_port: Option<u16>,
    pub urls: Vec<String>,
    pub staged_website_path: PathBuf,
    pub temp_config_path: PathBuf,
    pub remove_on_exit: bool,
}

impl ServerInstance {
    pub(crate) fn new(
        supervisor: ProcessSupervisor,
        site: SiteDefinition,
        http_port: u16,
        https_port: Option<u16>,
        temp_config_path: PathBuf,
    ) -> Self {
        Self {
            staged_path: site.physical_path.clone(),
            supervisor,
            site,
            http_port,
            https_port,
            temp_config_path,
        }
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn https_port(&self) -> Option<u16> {
        self.https_port
    }

    pub fn site(&self) -> &SiteDefinition {
        &self.site
    }

    pub fn staged_website_path(&self) -> &Path {
        &self.staged_path
    }

    pub fn temp_config_path(&self) -> &Path {
        &self.temp_config_path
    }

    /// Server executable invocation
    pub fn launch_command(&self) -> &LaunchCommand {
        self.supervisor.command()
    }

    pub fn remove_on_exit(&self) -> bool {
        self.supervisor.plan().remove_on_exit
    }

    /// Process id once the launch worker has published it
    pub fn process_id(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    /// Block until the launch resolves
    pub fn wait_for_launch(&self) -> LaunchOutcome {
        self.supervisor.wait_for_launch()
    }

    pub fn state(&self) -> SupervisorState {
        self.supervisor.state()
    }

    pub fn exit_status(&self) -> Option<ExitRecord> {
        self.supervisor.exit_status()
    }

    pub fn url(&self, protocol: Protocol) -> Option<String> {
        self.site.binding(protocol).map(|b| b.url())
    }

    pub fn summary(&self) -> InstanceSummary {
        InstanceSummary {
            site_name: self.site.name.clone(),
            site_id: self.site.id,
            process_id: self.process_id(),
            state: self.state(),
            http_port: self.http_port,
            https_port: self.https_port,
            urls: self.site.bindings.iter().map(|b| b.url()).collect(),
            staged_website_path: self.staged_path.clone(),
            temp_config_path: self.temp_config_path.clone(),
            remove_on_exit: self.remove_on_exit(),
        }
    }

    /// Stop the server and release its resources; later calls are no-ops
    pub fn dispose(&self) -> Result<()> {
        self.supervisor.dispose()
    }
}
