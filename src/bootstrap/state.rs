//! Gateway lifecycle state.

use serde::Serialize;
use std::fmt;

/// Lifecycle of a [`Gateway`](super::Gateway).
///
/// `Stopped -> Running -> (Draining) -> Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// No socket bound, no loops running
    Stopped,
    /// Accepting and answering attaches
    Running,
    /// Graceful drain in progress; attaches are still answered
    Draining,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
