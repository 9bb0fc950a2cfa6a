//! Session lifecycle types

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a process session
///
/// `Idle → Starting → Running → Stopping → Stopped`. A failed start goes
/// straight from `Starting` to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, no process yet
    Idle,
    /// Allocating the terminal and spawning the process
    Starting,
    /// Process is up and accepts prompts
    Running,
    /// Stop in progress
    Stopping,
    /// Terminal released, process gone
    Stopped,
}

impl SessionState {
    /// Get state string for logs and user-facing messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }

    /// Whether prompts may be sent in this state
    pub fn accepts_prompts(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether the session has reached its final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a streaming task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum StreamOutcome {
    /// The terminal closed and the remaining buffer was flushed
    Completed { deliveries: u64 },
    /// Superseded by a newer send, or stopped
    Cancelled { deliveries: u64 },
    /// The terminal reported an unexpected read error
    Failed { deliveries: u64 },
}

impl StreamOutcome {
    /// Number of chunks handed to the sink
    pub fn deliveries(&self) -> u64 {
        match self {
            Self::Completed { deliveries }
            | Self::Cancelled { deliveries }
            | Self::Failed { deliveries } => *deliveries,
        }
    }
}
