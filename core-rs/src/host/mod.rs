// host/mod.rs - Orchestration of ephemeral server instances

pub mod instance;
pub mod options;
pub mod orchestrator;

pub use instance::{InstanceSummary, ServerInstance};
pub use options::{CopiedCallback, WebsiteOptions};
pub use orchestrator::{SiteHost, HOST_CONFIG_FILE_NAME, STAGING_DIR_NAME};
