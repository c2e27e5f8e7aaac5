//! Snapshot of TCP endpoints currently in use on this host
//!
//! Linux reads the kernel socket tables in `/proc/net/tcp` and `/proc/net/tcp6`.
//! Other platforms fall back to a bind probe per candidate port.

use std::collections::HashSet;
use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::port::range::PortPoolRange;

/// Source of active local TCP ports
pub trait ConnectionTable: Send + Sync {
    /// Take one snapshot of local ports in use within `range`
    fn active_ports(&self, range: &PortPoolRange) -> Result<HashSet<u16>>;
}

/// Operating-system backed connection table
#[derive(Debug, Clone)]
pub struct SystemConnectionTable {
    proc_root: PathBuf,
}

impl Default for SystemConnectionTable {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl SystemConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read socket tables from an alternate proc root (used by tests)
    pub fn with_proc_root<P: AsRef<Path>>(proc_root: P) -> Self {
        Self {
            proc_root: proc_root.as_ref().to_path_buf(),
        }
    }

    fn read_proc_tables(&self) -> Result<HashSet<u16>> {
        let mut ports = HashSet::new();

        for table in ["tcp", "tcp6"] {
            let path = self.proc_root.join("net").join(table);
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                // tcp6 is absent when IPv6 is disabled
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            ports.extend(parse_proc_net_tcp(&content));
        }

        Ok(ports)
    }

    /// Test if port can be bound on the loopback interface
    pub fn is_port_available(port: u16) -> bool {
        TcpListener::bind(("127.0.0.1", port)).is_ok()
    }
}

impl ConnectionTable for SystemConnectionTable {
    fn active_ports(&self, range: &PortPoolRange) -> Result<HashSet<u16>> {
        if cfg!(target_os = "linux") && self.proc_root.join("net").join("tcp").exists() {
            let all = self.read_proc_tables()?;
            return Ok(all.into_iter().filter(|p| range.contains(*p)).collect());
        }

        Ok(range
            .ports()
            .filter(|port| !Self::is_port_available(*port))
            .collect())
    }
}

/// Fixed set of active ports
#[derive(Debug, Clone, Default)]
pub struct StaticConnectionTable {
    ports: HashSet<u16>,
}

impl StaticConnectionTable {
    pub fn new<I: IntoIterator<Item = u16>>(ports: I) -> Self {
        Self {
            ports: ports.into_iter().collect(),
        }
    }
}

impl ConnectionTable for StaticConnectionTable {
    fn active_ports(&self, range: &PortPoolRange) -> Result<HashSet<u16>> {
        Ok(self.ports.iter().copied().filter(|p| range.contains(*p)).collect())
    }
}

/// Extract local ports from the body of `/proc/net/tcp` or `/proc/net/tcp6`
///
/// Each data row carries `sl local_address rem_address st ...` where
/// `local_address` is `HEXADDR:HEXPORT`. Rows that do not parse are skipped.
pub fn parse_proc_net_tcp(content: &str) -> HashSet<u16> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let local = line.split_whitespace().nth(1)?;
            let (_, port_hex) = local.rsplit_once(':')?;
            u16::from_str_radix(port_hex, 16).ok()
        })
        .collect()
}
