use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Time a server gets to exit after `stop` before it is killed.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Grace used when replacing an instance that never finished starting.
    #[serde(default = "default_replace_wait_secs")]
    pub replace_wait_secs: u64,
    /// How long the exit monitor waits for output readers to reach EOF.
    #[serde(default = "default_reader_drain_ms")]
    pub reader_drain_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stop_grace_secs: default_stop_grace_secs(),
            write_timeout_ms: default_write_timeout_ms(),
            replace_wait_secs: default_replace_wait_secs(),
            reader_drain_ms: default_reader_drain_ms(),
        }
    }
}

impl SupervisorConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn replace_wait(&self) -> Duration {
        Duration::from_secs(self.replace_wait_secs)
    }

    pub fn reader_drain(&self) -> Duration {
        Duration::from_millis(self.reader_drain_ms)
    }
}

fn default_stop_grace_secs() -> u64 {
    12
}

fn default_write_timeout_ms() -> u64 {
    5000
}

fn default_replace_wait_secs() -> u64 {
    5
}

fn default_reader_drain_ms() -> u64 {
    2000
}
