//! Site, binding and host-name rules for generated host configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Host name used unless a custom one is supplied
pub const DEFAULT_HOST_NAME: &str = "localhost";

/// Default site name prefix, combined with the http port
pub const DEFAULT_SITE_NAME_PREFIX: &str = "SiteStage";

/// Default application pool assigned to the site root
pub const DEFAULT_APPLICATION_POOL: &str = "Clr4IntegratedAppPool";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the host name bindings are registered under
///
/// A custom name wins only when it is non-blank and is not `localhost`
/// (compared case-insensitively).
pub fn resolve_host_name(custom: Option<&str>) -> String {
    match custom.map(str::trim) {
        Some(name) if !name.is_empty() && !name.eq_ignore_ascii_case(DEFAULT_HOST_NAME) => name.to_string(),
        _ => DEFAULT_HOST_NAME.to_string(),
    }
}

/// Site name for an instance, `"{prefix}_{http_port}"`
pub fn site_name(prefix: &str, http_port: u16) -> String {
    format!("{}_{}", prefix, http_port)
}

/// A (protocol, host name, port) tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteBinding {
    pub protocol: Protocol,
    pub host_name: String,
    pub port: u16,
}

impl SiteBinding {
    pub fn new(protocol: Protocol, host_name: &str, port: u16) -> Self {
        Self {
            protocol,
            host_name: host_name.to_string(),
            port,
        }
    }

    /// `*:<port>:<host>` form used in binding entries
    pub fn binding_information(&self) -> String {
        format!("*:{}:{}", self.port, self.host_name)
    }

    /// Address a client would use to reach this binding
    pub fn url(&self) -> String {
        format!("{}://{}:{}/", self.protocol, self.host_name, self.port)
    }
}

/// Everything registered for one instance's site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDefinition {
    pub name: String,
    /// Equal to the http port
    pub id: u32,
    pub bindings: Vec<SiteBinding>,
    pub application_pool: String,
    pub physical_path: PathBuf,
}

impl SiteDefinition {
    /// Build the site for an instance
    ///
    /// # Arguments
    /// * `name_prefix` - Prefix of the site name
    /// * `http_port` - Port of the http binding, also used as the site id
    /// * `https_port` - Adds an https binding when present
    /// * `custom_host_name` - See [`resolve_host_name`]
    /// * `application_pool` - Pool assigned to the root path
    /// * `physical_path` - Staged website directory
    pub fn new<P: Into<PathBuf>>(
        name_prefix: &str,
        http_port: u16,
        https_port: Option<u16>,
        custom_host_name: Option<&str>,
        application_pool: &str,
        physical_path: P,
    ) -> Self {
        let host_name = resolve_host_name(custom_host_name);

        let mut bindings = vec![SiteBinding::new(Protocol::Http, &host_name, http_port)];
        if let Some(port) = https_port {
            bindings.push(SiteBinding::new(Protocol::Https, &host_name, port));
        }

        Self {
            name: site_name(name_prefix, http_port),
            id: u32::from(http_port),
            bindings,
            application_pool: application_pool.to_string(),
            physical_path: physical_path.into(),
        }
    }

    /// `[name='N',id='I']` selector prefixing every site command
    pub fn selector(&self) -> String {
        format!("[name='{}',id='{}']", self.name, self.id)
    }

    pub fn binding(&self, protocol: Protocol) -> Option<&SiteBinding> {
        self.bindings.iter().find(|b| b.protocol == protocol)
    }
}
