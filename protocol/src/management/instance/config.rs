use crate::backup::RetentionPolicy;
use crate::utils::Encoding;
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_XMS: &str = "1G";
pub const DEFAULT_XMX: &str = "2G";
pub const DEFAULT_BACKUP_INTERVAL_MINUTES: u32 = 10;
pub const DEFAULT_BACKUP_KEEP: u32 = 10;

/// Optional entries copied next to the world directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupExtras {
    #[serde(default)]
    pub backup_mods: bool,
    #[serde(default)]
    pub backup_plugins: bool,
    #[serde(default)]
    pub backup_config: bool,
    #[serde(default)]
    pub backup_server_properties: bool,
    #[serde(default)]
    pub backup_whitelist: bool,
}

impl BackupExtras {
    /// Relative names of the enabled extras, in a fixed order.
    pub fn entries(&self) -> Vec<&'static str> {
        [
            (self.backup_mods, "mods"),
            (self.backup_plugins, "plugins"),
            (self.backup_config, "config"),
            (self.backup_server_properties, "server.properties"),
            (self.backup_whitelist, "whitelist.json"),
        ]
        .into_iter()
        .filter_map(|(enabled, name)| enabled.then_some(name))
        .collect()
    }
}

/// Per-server operator choices, stored as one flat key/value record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_xms")]
    pub xms: String,
    #[serde(default = "default_xmx")]
    pub xmx: String,
    /// Jar to launch; discovered in the server directory when unset.
    #[serde(default)]
    pub jar: Option<String>,
    #[serde(default = "default_java_path")]
    pub java_path: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default = "default_true")]
    pub startup_backup: bool,
    #[serde(default)]
    pub periodic_backup: bool,
    #[serde(
        default = "default_interval",
        deserialize_with = "interval_or_default"
    )]
    pub backup_interval_minutes: u32,
    #[serde(default = "default_keep", deserialize_with = "keep_or_default")]
    pub backup_keep: u32,
    #[serde(flatten)]
    pub extras: BackupExtras,
    #[serde(default)]
    pub input_encoding: Encoding,
    #[serde(default)]
    pub output_encoding: Encoding,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            xms: default_xms(),
            xmx: default_xmx(),
            jar: None,
            java_path: default_java_path(),
            arguments: vec![],
            startup_backup: true,
            periodic_backup: false,
            backup_interval_minutes: DEFAULT_BACKUP_INTERVAL_MINUTES,
            backup_keep: DEFAULT_BACKUP_KEEP,
            extras: BackupExtras::default(),
            input_encoding: Encoding::default(),
            output_encoding: Encoding::default(),
        }
    }
}

impl ServerSettings {
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.backup_keep)
    }
}

fn default_xms() -> String {
    DEFAULT_XMS.to_owned()
}

fn default_xmx() -> String {
    DEFAULT_XMX.to_owned()
}

fn default_java_path() -> String {
    "java".to_owned()
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u32 {
    DEFAULT_BACKUP_INTERVAL_MINUTES
}

fn default_keep() -> u32 {
    DEFAULT_BACKUP_KEEP
}

// Hand-edited files end up with "10", 10, "" or "ten"; only positive integers count.
#[derive(Deserialize)]
#[serde(untagged)]
enum LenientNumber {
    Number(i64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

impl LenientNumber {
    fn positive(self) -> Option<u32> {
        match self {
            LenientNumber::Number(n) => u32::try_from(n).ok(),
            LenientNumber::Text(s) => s.trim().parse::<u32>().ok(),
            LenientNumber::Other(_) => None,
        }
        .filter(|n| *n > 0)
    }
}

fn interval_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(LenientNumber::deserialize(deserializer)?
        .positive()
        .unwrap_or(DEFAULT_BACKUP_INTERVAL_MINUTES))
}

fn keep_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(LenientNumber::deserialize(deserializer)?
        .positive()
        .unwrap_or(DEFAULT_BACKUP_KEEP))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_record_uses_defaults() {
        let settings: ServerSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, ServerSettings::default());
        assert_eq!(settings.retention().keep_count(), 10);
    }

    #[test]
    fn non_numeric_cadence_falls_back() {
        let settings: ServerSettings = serde_json::from_str(
            r#"{"backup_interval_minutes": "soon", "backup_keep": 0}"#,
        )
        .unwrap();
        assert_eq!(settings.backup_interval_minutes, 10);
        assert_eq!(settings.backup_keep, 10);

        let settings: ServerSettings = serde_json::from_str(
            r#"{"backup_interval_minutes": " 15 ", "backup_keep": 3}"#,
        )
        .unwrap();
        assert_eq!(settings.backup_interval_minutes, 15);
        assert_eq!(settings.backup_keep, 3);
    }

    #[test]
    fn round_trips_the_same_keys() {
        let settings = ServerSettings {
            xms: "512M".into(),
            xmx: "4G".into(),
            jar: Some("paper.jar".into()),
            periodic_backup: true,
            backup_interval_minutes: 30,
            backup_keep: 5,
            extras: BackupExtras {
                backup_plugins: true,
                backup_whitelist: true,
                ..Default::default()
            },
            output_encoding: Encoding::GBK,
            ..Default::default()
        };
        let text = serde_json::to_string(&settings).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        // flat record: extras live at the top level
        assert_eq!(value["backup_plugins"], serde_json::Value::Bool(true));
        let back: ServerSettings = serde_json::from_str(&text).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn extras_are_listed_in_order() {
        let extras = BackupExtras {
            backup_mods: true,
            backup_server_properties: true,
            backup_whitelist: true,
            ..Default::default()
        };
        assert_eq!(
            extras.entries(),
            vec!["mods", "server.properties", "whitelist.json"]
        );
    }
}
