use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backup::{BackupRecord, TriggerKind};

/// Who produced the text of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOrigin {
    /// A line read from the server's console output.
    Console,
    /// A message raised by the daemon itself (supervisor, backups, readers).
    Daemon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Line,
    Spawned {
        pid: Option<u32>,
    },
    Exited {
        code: Option<i32>,
    },
    ForceKilled,
    BackupFinished {
        trigger: TriggerKind,
        record: Option<Box<BackupRecord>>,
        error: Option<String>,
    },
}

/// One entry of the event bus. Immutable once pushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub seq: u64,
    pub time: DateTime<Utc>,
    pub instance: Option<Uuid>,
    pub origin: LogOrigin,
    pub severity: Severity,
    pub kind: EventKind,
    pub text: String,
}

impl LogEvent {
    pub fn is_console_line(&self) -> bool {
        self.origin == LogOrigin::Console && self.kind == EventKind::Line
    }
}
