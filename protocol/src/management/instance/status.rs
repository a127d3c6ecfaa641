use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one managed server process.
///
/// `Stopped` is terminal: running the server again means a new instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "code", rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Idle,
    Launching,
    Starting,
    Running,
    Stopping,
    Stopped(Option<i32>),
}

impl LifecycleState {
    pub fn can_transition_to(&self, next: &LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Idle, Launching)
                | (Launching, Starting)
                | (Launching, Stopped(_))
                | (Starting, Running)
                | (Starting, Stopping)
                | (Starting, Stopped(_))
                | (Running, Stopping)
                | (Running, Stopped(_))
                | (Stopping, Stopped(_))
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Stopped(_))
    }

    /// A process exists (or is being created) for this state.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            LifecycleState::Launching
                | LifecycleState::Starting
                | LifecycleState::Running
                | LifecycleState::Stopping
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Idle => f.write_str("idle"),
            LifecycleState::Launching => f.write_str("launching"),
            LifecycleState::Starting => f.write_str("starting"),
            LifecycleState::Running => f.write_str("running"),
            LifecycleState::Stopping => f.write_str("stopping"),
            LifecycleState::Stopped(Some(code)) => write!(f, "stopped (exit code {})", code),
            LifecycleState::Stopped(None) => f.write_str("stopped"),
        }
    }
}
