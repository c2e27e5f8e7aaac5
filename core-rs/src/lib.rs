//! # sitestage - Ephemeral Web Server Instances
//!
//! Provisions short-lived, isolated instances of a local web server
//! (IIS Express style: a server executable plus an `appcmd`-style admin
//! tool) for integration tests, and guarantees they are torn down.
//!
//! ## Lifecycle
//!
//! ```text
//! allocate ports ─▶ stage website ─▶ transform config ─▶ generate host config ─▶ launch
//!                                                                                  │
//!       remove temp config ◀─ remove staged dir ◀─ kill server ◀─ kill orphans ◀─ dispose
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use sitestage_core::{SiteHost, SiteHostConfig, WebsiteOptions};
//!
//! # fn run() -> sitestage_core::Result<()> {
//! let host = SiteHost::new(SiteHostConfig::default())?;
//! let instance = host.start_website_blocking(
//!     WebsiteOptions::new(r"C:\src\MySite", r"C:\src\applicationhost.config").https(None),
//! )?;
//! println!("serving on {}", instance.http_port());
//! instance.dispose()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod exec;
pub mod host;
pub mod port;
pub mod siteconfig;
pub mod staging;
pub mod supervisor;
pub mod transform;

pub use config::SiteHostConfig;
pub use errors::{Result, SiteError};
pub use host::{InstanceSummary, ServerInstance, SiteHost, WebsiteOptions};
pub use port::{ConnectionTable, PortAllocator, PortPoolRange};
pub use siteconfig::{AdminTool, AppCmd, Protocol, SiteBinding, SiteConfigGenerator, SiteDefinition};
pub use staging::{DirectoryExclusionPolicy, DirectoryStager, FileExclusionPolicy, RetryPolicy};
pub use supervisor::{LaunchCommand, ProcessInspector, ProcessSupervisor, SupervisorState, TeardownPlan};
pub use transform::{CommandTransformer, ConfigTransformer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable overriding the configuration file location
pub const CONFIG_ENV_VAR: &str = "SITESTAGE_CONFIG";
