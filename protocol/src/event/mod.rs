pub mod log;

pub use self::log::{EventKind, LogEvent, LogOrigin, Severity};

use crate::management::instance::LifecycleState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub instance: Uuid,
    pub server: String,
    pub from: LifecycleState,
    pub to: LifecycleState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterChange {
    pub instance: Uuid,
    /// Sorted player names.
    pub players: Vec<String>,
}
