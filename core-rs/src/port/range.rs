/**
 * range.rs
 * Contiguous pool of candidate TCP ports
 *
 * A pool is described by a start port and a count. The scan covers
 * [start, start + count] inclusive, so a pool of (45000, 100) checks
 * 101 candidates.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{Result, SiteError};

/// Highest valid TCP port
pub const MAX_PORT: u32 = 65535;

/// Port pool range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPortPoolRange", into = "RawPortPoolRange")]
pub struct PortPoolRange {
    start: u16,
    count: u16,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawPortPoolRange {
    start: u32,
    count: u32,
}

impl PortPoolRange {
    /// Create a validated range
    ///
    /// # Errors
    /// Returns `SiteError::Argument` if `start` or `start + count`
    /// falls outside 0..=65535.
    pub fn new(start: u32, count: u32) -> Result<Self> {
        if start > MAX_PORT {
            return Err(SiteError::Argument(format!(
                "Port must be a number between 0 and {}, got {}",
                MAX_PORT, start
            )));
        }

        let end = start as u64 + count as u64;
        if end > MAX_PORT as u64 {
            return Err(SiteError::Argument(format!(
                "The last port number cannot be greater than {}, got {}",
                MAX_PORT, end
            )));
        }

        Ok(Self {
            start: start as u16,
            count: count as u16,
        })
    }

    /// A range holding exactly one candidate
    pub fn single(port: u16) -> Self {
        Self { start: port, count: 0 }
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    /// Last candidate port (inclusive)
    pub fn end(&self) -> u16 {
        self.start + self.count
    }

    /// Check if port is within this range
    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end()
    }

    /// Candidate ports in ascending order
    pub fn ports(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end()
    }
}

impl fmt::Display for PortPoolRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end())
        }
    }
}

impl TryFrom<RawPortPoolRange> for PortPoolRange {
    type Error = SiteError;

    fn try_from(raw: RawPortPoolRange) -> Result<Self> {
        PortPoolRange::new(raw.start, raw.count)
    }
}

impl From<PortPoolRange> for RawPortPoolRange {
    fn from(range: PortPoolRange) -> Self {
        RawPortPoolRange {
            start: range.start as u32,
            count: range.count as u32,
        }
    }
}
