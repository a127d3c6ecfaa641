use log::warn;
use mcsm_protocol::management::instance::ServerSettings;
use std::path::{Path, PathBuf};

use super::file::{Config, FileIoWithBackup};

struct SettingsFile;

impl FileIoWithBackup for SettingsFile {}

impl Config for SettingsFile {
    type ConfigType = ServerSettings;
}

/// Per-server settings, one JSON file per server under `root`.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    root: PathBuf,
}

impl SettingsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, server_dir: &Path) -> PathBuf {
        let name = server_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "server".to_owned());
        self.root.join(format!("{}.json", name))
    }

    /// Loads the settings, writing defaults on first use.
    pub fn load(&self, server_dir: &Path) -> anyhow::Result<ServerSettings> {
        SettingsFile::load_config_or_default(self.path_for(server_dir), ServerSettings::default)
    }

    /// Like `load`, but an unreadable file yields defaults.
    pub fn load_or_default(&self, server_dir: &Path) -> ServerSettings {
        self.load(server_dir).unwrap_or_else(|err| {
            warn!(
                "settings for {:?} unreadable, using defaults: {}",
                server_dir, err
            );
            ServerSettings::default()
        })
    }

    pub fn save(&self, server_dir: &Path, settings: &ServerSettings) -> anyhow::Result<()> {
        SettingsFile::save_config(self.path_for(server_dir), settings)
    }
}
