// siteconfig/mod.rs - Host configuration generation

pub mod admin;
pub mod binding;
pub mod generator;

pub use admin::{AdminTool, AppCmd};
pub use binding::{
    resolve_host_name, site_name, Protocol, SiteBinding, SiteDefinition, DEFAULT_APPLICATION_POOL,
    DEFAULT_HOST_NAME, DEFAULT_SITE_NAME_PREFIX,
};
pub use generator::{site_commands, SiteConfigGenerator};
