use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::backup::BackupConfig;
use crate::management::SupervisorConfig;
use crate::pipeline::DispatchConfig;
use crate::storage::file::{Config, FileIoWithBackup};

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Daemon-wide settings. Read once at startup; changes need a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_backup_root")]
    pub backup_root: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_settings_dir")]
    pub settings_dir: PathBuf,
    /// Append every console line to `<log_dir>/console-<timestamp>.log`.
    #[serde(default = "default_true")]
    pub console_transcript: bool,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backup_root: default_backup_root(),
            log_dir: default_log_dir(),
            settings_dir: default_settings_dir(),
            console_transcript: true,
            supervisor: SupervisorConfig::default(),
            backup: BackupConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl FileIoWithBackup for AppConfig {}

impl Config for AppConfig {
    type ConfigType = AppConfig;
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<AppConfig> {
        Self::load_config_or_default(path, Self::default)
    }

    /// Directory names that are never treated as world data.
    pub fn infrastructure_names(&self) -> Vec<String> {
        let mut names: Vec<String> = ["logs", "backups", "crash-reports", "cache", "libraries"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for path in [&self.backup_root, &self.log_dir, &self.settings_dir] {
            if let Some(name) = path.file_name() {
                let name = name.to_string_lossy().into_owned();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

fn default_backup_root() -> PathBuf {
    PathBuf::from("backups")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_settings_dir() -> PathBuf {
    PathBuf::from("servers")
}

fn default_true() -> bool {
    true
}
