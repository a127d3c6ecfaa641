use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When a startup backup removes the previous startup snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupEviction {
    /// Old snapshots go first; a failed copy leaves no startup snapshot at all.
    #[default]
    BeforeCopy,
    /// Old snapshots go only after the new one is complete.
    AfterCopy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_save_all_settle_ms")]
    pub save_all_settle_ms: u64,
    #[serde(default = "default_save_off_settle_ms")]
    pub save_off_settle_ms: u64,
    #[serde(default)]
    pub startup_eviction: StartupEviction,
    #[serde(default = "default_periodic_tick_ms")]
    pub periodic_tick_ms: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            save_all_settle_ms: default_save_all_settle_ms(),
            save_off_settle_ms: default_save_off_settle_ms(),
            startup_eviction: StartupEviction::default(),
            periodic_tick_ms: default_periodic_tick_ms(),
        }
    }
}

impl BackupConfig {
    pub fn save_all_settle(&self) -> Duration {
        Duration::from_millis(self.save_all_settle_ms)
    }

    pub fn save_off_settle(&self) -> Duration {
        Duration::from_millis(self.save_off_settle_ms)
    }

    pub fn periodic_tick(&self) -> Duration {
        Duration::from_millis(self.periodic_tick_ms.max(1))
    }
}

fn default_save_all_settle_ms() -> u64 {
    2000
}

fn default_save_off_settle_ms() -> u64 {
    1000
}

fn default_periodic_tick_ms() -> u64 {
    1000
}
