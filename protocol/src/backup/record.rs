use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::DEFAULT_KEEP_COUNT;

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Startup,
    Periodic,
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Startup => "startup",
            TriggerKind::Periodic => "periodic",
            TriggerKind::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startup" => Ok(TriggerKind::Startup),
            "periodic" => Ok(TriggerKind::Periodic),
            "manual" => Ok(TriggerKind::Manual),
            other => Err(format!("unknown trigger kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// One completed or attempted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Final component of the server's working directory.
    pub server: String,
    pub created_at: DateTime<Local>,
    pub trigger: TriggerKind,
    pub path: PathBuf,
    /// Top-level names copied into the snapshot (`world`, `world_nether`, `mods`, ...).
    pub entries: Vec<String>,
    /// Set when no world directory was found and the whole server directory was copied.
    #[serde(default)]
    pub full_copy: bool,
    #[serde(default)]
    pub failures: Vec<CopyFailure>,
    pub success: bool,
}

impl BackupRecord {
    pub fn folder_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

/// How many non-startup snapshots to keep per server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    keep_count: u32,
}

impl RetentionPolicy {
    /// `keep_count` is clamped to at least one.
    pub fn new(keep_count: u32) -> Self {
        Self {
            keep_count: keep_count.max(1),
        }
    }

    pub fn keep_count(&self) -> u32 {
        self.keep_count
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_KEEP_COUNT)
    }
}
