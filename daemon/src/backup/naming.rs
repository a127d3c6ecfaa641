use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use lazy_static::lazy_static;
use mcsm_protocol::backup::{BackupRecord, TriggerKind};
use regex::Regex;
use std::io;
use std::path::Path;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
pub const MANIFEST_FILE: &str = ".snapshot.json";

lazy_static! {
    static ref SNAPSHOT_PATTERN: Regex =
        Regex::new(r"^backup-(\d{8}-\d{6})(?:-(\d+))?_(startup|manual|periodic)$")
            .expect("Failed to compile SNAPSHOT_PATTERN regex");
}

/// Parsed `backup-<YYYYMMDD-HHMMSS>[-N]_<trigger>` folder name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotName {
    pub stamp: String,
    pub counter: Option<u32>,
    pub trigger: TriggerKind,
}

impl SnapshotName {
    pub fn parse(name: &str) -> Option<Self> {
        let caps = SNAPSHOT_PATTERN.captures(name)?;
        Some(Self {
            stamp: caps[1].to_owned(),
            counter: caps.get(2).and_then(|c| c.as_str().parse().ok()),
            trigger: caps[3].parse().ok()?,
        })
    }

    pub fn created_at(&self) -> Option<DateTime<Local>> {
        let naive = NaiveDateTime::parse_from_str(&self.stamp, TIMESTAMP_FORMAT).ok()?;
        Local.from_local_datetime(&naive).earliest()
    }

    pub fn render(&self) -> String {
        match self.counter {
            Some(n) => format!("backup-{}-{}_{}", self.stamp, n, self.trigger),
            None => format!("backup-{}_{}", self.stamp, self.trigger),
        }
    }
}

/// Hidden sibling the snapshot is assembled in before it gets its final name.
pub fn staging_name(folder: &str) -> String {
    format!(".{}.partial", folder)
}

/// First free folder name for `at`; a counter is added only on collision.
pub fn unique_folder_name(dest_root: &Path, at: DateTime<Local>, trigger: TriggerKind) -> String {
    let mut name = SnapshotName {
        stamp: at.format(TIMESTAMP_FORMAT).to_string(),
        counter: None,
        trigger,
    };
    let mut counter = 0;
    loop {
        let candidate = name.render();
        let taken = dest_root.join(&candidate).exists()
            || dest_root.join(staging_name(&candidate)).exists();
        if !taken {
            return candidate;
        }
        counter += 1;
        name.counter = Some(counter);
    }
}

pub fn write_manifest(folder: &Path, record: &BackupRecord) -> io::Result<()> {
    let content = serde_json::to_string_pretty(record).map_err(io::Error::other)?;
    std::fs::write(folder.join(MANIFEST_FILE), content)
}

pub fn read_manifest(folder: &Path) -> Option<BackupRecord> {
    let content = std::fs::read_to_string(folder.join(MANIFEST_FILE)).ok()?;
    serde_json::from_str(&content).ok()
}
