//! Supervisor lifecycle states

use serde::Serialize;
use std::fmt;

/// `NotStarted -> Starting -> Running -> Stopping -> Stopped`
///
/// `Stopping` may also be entered straight from `NotStarted` or `Starting`
/// when an instance is disposed before its server came up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SupervisorState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl SupervisorState {
    /// True once teardown has begun
    pub fn is_disposing(&self) -> bool {
        matches!(self, SupervisorState::Stopping | SupervisorState::Stopped)
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::NotStarted => "not-started",
            SupervisorState::Starting => "starting",
            SupervisorState::Running => "running",
            SupervisorState::Stopping => "stopping",
            SupervisorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
