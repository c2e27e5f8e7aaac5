/**
 * allocator.rs
 * First-free port selection within a pool
 *
 * Allocation strategy:
 * - Take ONE snapshot of active local TCP ports
 * - Walk the pool ascending from its start
 * - Return the first port that is neither active nor excluded
 *
 * The result is best effort: another process may bind the port between
 * the snapshot and the server start. Callers must tolerate a bind failure.
 */

use std::collections::HashSet;
use std::sync::Arc;

use crate::errors::{Result, SiteError};
use crate::port::connections::{ConnectionTable, SystemConnectionTable};
use crate::port::range::PortPoolRange;

/// Port allocator over a connection table
#[derive(Clone)]
pub struct PortAllocator {
    connections: Arc<dyn ConnectionTable>,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(Arc::new(SystemConnectionTable::new()))
    }
}

impl PortAllocator {
    /// Create an allocator reading active ports from `connections`
    pub fn new(connections: Arc<dyn ConnectionTable>) -> Self {
        Self { connections }
    }

    /// Find the lowest available port in `range`
    ///
    /// # Arguments
    /// * `range` - Candidate pool, scanned ascending and inclusive of its end
    /// * `excluded` - Ports the caller has already claimed
    ///
    /// # Errors
    /// Returns `SiteError::NoAvailablePort` when every candidate is active or excluded
    pub fn get_available_port(&self, range: &PortPoolRange, excluded: &[u16]) -> Result<u16> {
        let active = self.connections.active_ports(range)?;
        let excluded: HashSet<u16> = excluded.iter().copied().collect();

        for port in range.ports() {
            if active.contains(&port) || excluded.contains(&port) {
                continue;
            }

            tracing::debug!(port, range = %range, "Selected available port");
            return Ok(port);
        }

        Err(SiteError::NoAvailablePort(format!(
            "{} ({} active, {} excluded)",
            range,
            active.len(),
            excluded.len()
        )))
    }
}
