use async_trait::async_trait;
use chrono::Local;
use log::{debug, warn};
use mcsm_protocol::backup::{BackupRecord, RetentionPolicy, TriggerKind};
use mcsm_protocol::event::{EventKind, LogOrigin, Severity};
use mcsm_protocol::management::instance::{BackupExtras, LifecycleState};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

use super::config::{BackupConfig, StartupEviction};
use super::error::{BackupError, RestoreError};
use super::naming::{self, SnapshotName};
use super::world;
use crate::management::WriteError;
use crate::pipeline::EventBus;
use crate::storage::{copy_tree, remove_entry, CopyReport};

pub const SAVE_ALL: &str = "save-all";
pub const SAVE_OFF: &str = "save-off";
pub const SAVE_ON: &str = "save-on";

/// What the backup engine needs from a running server.
#[async_trait]
pub trait ConsoleHandle: Send + Sync {
    fn instance_id(&self) -> Option<Uuid>;
    fn state(&self) -> LifecycleState;
    async fn send_line(&self, text: &str) -> Result<(), WriteError>;
}

/// Looks up the console of the server living in a directory.
pub trait ConsoleRegistry: Send + Sync {
    fn console_for(&self, dir: &Path) -> Option<Arc<dyn ConsoleHandle>>;
}

pub fn server_name(server_dir: &Path) -> String {
    server_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "server".to_owned())
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Snapshots, prunes and restores world data under `<backup_root>/<server>/`.
pub struct BackupEngine {
    backup_root: PathBuf,
    infrastructure: Vec<String>,
    config: BackupConfig,
    bus: EventBus,
    consoles: Arc<dyn ConsoleRegistry>,
}

impl BackupEngine {
    pub fn new(
        backup_root: impl Into<PathBuf>,
        infrastructure: Vec<String>,
        config: BackupConfig,
        bus: EventBus,
        consoles: Arc<dyn ConsoleRegistry>,
    ) -> Self {
        Self {
            backup_root: backup_root.into(),
            infrastructure,
            config,
            bus,
            consoles,
        }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// `<backup_root>/<server name>`
    pub fn server_root(&self, server_dir: &Path) -> PathBuf {
        self.backup_root.join(server_name(&absolute(server_dir)))
    }

    pub fn console_state(&self, server_dir: &Path) -> Option<LifecycleState> {
        self.consoles
            .console_for(server_dir)
            .map(|console| console.state())
    }

    /// Takes one snapshot, quiescing world saves while the server runs.
    pub async fn backup_now(
        &self,
        server_dir: &Path,
        trigger: TriggerKind,
        extras: &BackupExtras,
    ) -> Result<BackupRecord, BackupError> {
        let server_dir = absolute(server_dir);
        if !server_dir.is_dir() {
            return Err(BackupError::ServerDirMissing(server_dir));
        }
        let console = self.consoles.console_for(&server_dir);
        let instance = console.as_ref().and_then(|c| c.instance_id());
        let dest_root = self.server_root(&server_dir);

        if trigger == TriggerKind::Startup && self.config.startup_eviction == StartupEviction::BeforeCopy {
            self.evict_startup(&dest_root, None, instance).await;
        }

        self.bus
            .daemon(
                instance,
                Severity::Info,
                format!("{} backup of {} started", trigger, server_name(&server_dir)),
            )
            .await;

        let quiesced = match &console {
            Some(console) if console.state() == LifecycleState::Running => {
                self.quiesce(console.as_ref()).await;
                true
            }
            _ => false,
        };

        let job = {
            let server_dir = server_dir.clone();
            let dest_root = dest_root.clone();
            let infrastructure = self.infrastructure.clone();
            let extras = extras.clone();
            tokio::task::spawn_blocking(move || {
                take_snapshot(&server_dir, &dest_root, &infrastructure, &extras, trigger)
            })
        };
        let outcome = match job.await {
            Ok(outcome) => outcome,
            Err(err) => Err(BackupError::Worker(err.to_string())),
        };

        if quiesced {
            if let Some(console) = &console {
                if let Err(err) = console.send_line(SAVE_ON).await {
                    self.bus
                        .daemon(
                            instance,
                            Severity::Error,
                            format!("could not re-enable world saving: {}", err),
                        )
                        .await;
                }
            }
        }

        // a partial startup snapshot still replaces the older ones
        let written = match &outcome {
            Ok(record) => Some(record),
            Err(err) => err.record(),
        };
        if let Some(record) = written {
            if trigger == TriggerKind::Startup
                && self.config.startup_eviction == StartupEviction::AfterCopy
            {
                self.evict_startup(&dest_root, Some(&record.path), instance)
                    .await;
            }
        }
        outcome
    }

    async fn quiesce(&self, console: &dyn ConsoleHandle) {
        if console.send_line(SAVE_ALL).await.is_ok() {
            tokio::time::sleep(self.config.save_all_settle()).await;
        }
        if console.send_line(SAVE_OFF).await.is_ok() {
            tokio::time::sleep(self.config.save_off_settle()).await;
        }
    }

    async fn evict_startup(&self, dest_root: &Path, keep: Option<&Path>, instance: Option<Uuid>) {
        let mut evicted = 0;
        for (path, name) in snapshot_folders(dest_root) {
            if name.trigger != TriggerKind::Startup || keep == Some(path.as_path()) {
                continue;
            }
            match remove_entry(&path) {
                Ok(()) => evicted += 1,
                Err(err) => warn!("could not remove old startup snapshot {:?}: {}", path, err),
            }
        }
        if evicted > 0 {
            self.bus
                .daemon(
                    instance,
                    Severity::Info,
                    format!("removed {} previous startup snapshot(s)", evicted),
                )
                .await;
        }
    }

    /// Deletes the oldest non-startup snapshots beyond the retention count.
    pub fn prune(&self, server_dir: &Path, policy: RetentionPolicy) -> Vec<PathBuf> {
        let mut candidates: Vec<(SystemTime, String, PathBuf)> =
            snapshot_folders(&self.server_root(server_dir))
                .into_iter()
                .filter(|(_, name)| name.trigger != TriggerKind::Startup)
                .map(|(path, name)| {
                    let modified = fs::metadata(&path)
                        .and_then(|m| m.modified())
                        .unwrap_or(SystemTime::UNIX_EPOCH);
                    (modified, name.render(), path)
                })
                .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

        let mut removed = vec![];
        for (_, _, path) in candidates.into_iter().skip(policy.keep_count() as usize) {
            match remove_entry(&path) {
                Ok(()) => removed.push(path),
                Err(err) => warn!("could not prune snapshot {:?}: {}", path, err),
            }
        }
        removed
    }

    /// Snapshots of one server, newest first.
    pub fn list_snapshots(&self, server_dir: &Path) -> Vec<BackupRecord> {
        let server = server_name(&absolute(server_dir));
        let mut records: Vec<BackupRecord> = snapshot_folders(&self.server_root(server_dir))
            .into_iter()
            .map(|(path, name)| {
                naming::read_manifest(&path)
                    .map(|record| BackupRecord {
                        path: path.clone(),
                        ..record
                    })
                    .unwrap_or_else(|| BackupRecord {
                        server: server.clone(),
                        created_at: name.created_at().unwrap_or_else(Local::now),
                        trigger: name.trigger,
                        entries: world::snapshot_entries(&path, &self.infrastructure),
                        path,
                        full_copy: false,
                        failures: vec![],
                        success: true,
                    })
            })
            .collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.path.cmp(&a.path))
        });
        records
    }

    /// Removes one snapshot folder; refuses anything that is not a snapshot under the backup root.
    pub fn delete_snapshot(&self, record: &BackupRecord) -> std::io::Result<()> {
        let is_snapshot = record
            .folder_name()
            .is_some_and(|name| SnapshotName::parse(&name).is_some());
        if !is_snapshot || !crate::storage::files::is_within(&record.path, &self.backup_root) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{:?} is not a snapshot folder", record.path),
            ));
        }
        remove_entry(&record.path)
    }

    /// Puts a snapshot back in place of the live world data.
    ///
    /// Everything is staged next to the live entries first; live data is only
    /// touched once every entry has been copied.
    pub async fn restore(&self, server_dir: &Path, record: &BackupRecord) -> Result<(), RestoreError> {
        let server_dir = absolute(server_dir);
        if let Some(state) = self.console_state(&server_dir) {
            if !matches!(state, LifecycleState::Idle | LifecycleState::Stopped(_)) {
                return Err(RestoreError::ServerRunning(state));
            }
        }
        if !record.path.is_dir() {
            return Err(RestoreError::MissingSnapshot(record.path.clone()));
        }
        let manifest = naming::read_manifest(&record.path).unwrap_or_else(|| record.clone());
        if !manifest.success {
            return Err(RestoreError::IncompleteSnapshot(record.path.clone()));
        }

        let instance = self.consoles.console_for(&server_dir).and_then(|c| c.instance_id());
        let snapshot = record.path.clone();
        let infrastructure = self.infrastructure.clone();
        let target = server_dir.clone();
        let restored = tokio::task::spawn_blocking(move || {
            restore_entries(&target, &snapshot, &manifest, &infrastructure)
        })
        .await
        .map_err(|err| RestoreError::Worker(err.to_string()))??;

        self.bus
            .daemon(
                instance,
                Severity::Info,
                format!(
                    "restored {} from {:?}",
                    restored.join(", "),
                    record.folder_name().unwrap_or_default()
                ),
            )
            .await;
        Ok(())
    }

    /// Reports the end of a background backup on the event bus.
    pub async fn announce(
        &self,
        server_dir: &Path,
        trigger: TriggerKind,
        result: &Result<BackupRecord, BackupError>,
    ) {
        let instance = self
            .consoles
            .console_for(&absolute(server_dir))
            .and_then(|c| c.instance_id());
        let (severity, record, error, text) = match result {
            Ok(record) => (
                Severity::Info,
                Some(Box::new(record.clone())),
                None,
                format!(
                    "{} backup saved as {}",
                    trigger,
                    record.folder_name().unwrap_or_default()
                ),
            ),
            Err(err) => (
                if err.record().is_some() {
                    Severity::Warn
                } else {
                    Severity::Error
                },
                err.record().map(|r| Box::new(r.clone())),
                Some(err.to_string()),
                format!("{} backup failed: {}", trigger, err),
            ),
        };
        self.bus
            .publish(
                instance,
                LogOrigin::Daemon,
                severity,
                EventKind::BackupFinished {
                    trigger,
                    record,
                    error,
                },
                text,
            )
            .await;
    }

    /// One background backup: snapshot, prune when something was written,
    /// then `backup_finished` on the bus.
    pub async fn run_job(
        &self,
        server_dir: &Path,
        trigger: TriggerKind,
        extras: &BackupExtras,
        retention: RetentionPolicy,
    ) -> Result<BackupRecord, BackupError> {
        let result = self.backup_now(server_dir, trigger, extras).await;
        let written = match &result {
            Ok(_) => true,
            Err(err) => err.record().is_some(),
        };
        if written && trigger != TriggerKind::Startup {
            let removed = self.prune(server_dir, retention);
            if !removed.is_empty() {
                debug!("pruned {} old snapshot(s) of {:?}", removed.len(), server_dir);
            }
        }
        self.announce(server_dir, trigger, &result).await;
        result
    }
}

/// Snapshot folders directly under `dest_root` with their parsed names.
fn snapshot_folders(dest_root: &Path) -> Vec<(PathBuf, SnapshotName)> {
    let Ok(entries) = fs::read_dir(dest_root) else {
        return vec![];
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = SnapshotName::parse(&entry.file_name().to_string_lossy())?;
            Some((entry.path(), name))
        })
        .collect()
}

fn take_snapshot(
    server_dir: &Path,
    dest_root: &Path,
    infrastructure: &[String],
    extras: &BackupExtras,
    trigger: TriggerKind,
) -> Result<BackupRecord, BackupError> {
    let plan = world::resolve(server_dir, extras, infrastructure);
    fs::create_dir_all(dest_root)?;

    let created_at = Local::now();
    let folder = naming::unique_folder_name(dest_root, created_at, trigger);
    let staging = dest_root.join(naming::staging_name(&folder));
    remove_entry(&staging)?;

    let mut report = CopyReport::default();
    let mut copied = vec![];
    for entry in &plan.entries {
        let before = report.files;
        copy_tree(&server_dir.join(entry), &staging.join(entry), &mut report);
        if report.files > before {
            copied.push(entry.clone());
        }
    }

    if report.files == 0 {
        let _ = remove_entry(&staging);
        return Err(BackupError::NothingCopied(server_dir.to_path_buf()));
    }

    let record = BackupRecord {
        server: server_name(server_dir),
        created_at,
        trigger,
        path: dest_root.join(&folder),
        entries: copied,
        full_copy: plan.full_copy,
        success: report.failures.is_empty(),
        failures: report.failures,
    };
    let finish = naming::write_manifest(&staging, &record)
        .and_then(|_| fs::rename(&staging, &record.path));
    if let Err(err) = finish {
        let _ = remove_entry(&staging);
        return Err(err.into());
    }

    if record.success {
        Ok(record)
    } else {
        Err(BackupError::Partial {
            record: Box::new(record),
        })
    }
}

fn restore_entries(
    server_dir: &Path,
    snapshot: &Path,
    manifest: &BackupRecord,
    infrastructure: &[String],
) -> Result<Vec<String>, RestoreError> {
    let mut entries: Vec<String> = manifest
        .entries
        .iter()
        .filter(|entry| snapshot.join(entry).exists())
        .cloned()
        .collect();
    let has_world = entries
        .iter()
        .any(|entry| world::is_world_dir(&snapshot.join(entry)));
    if manifest.full_copy || !has_world {
        entries = world::snapshot_entries(snapshot, infrastructure);
    }

    let staged: Vec<(String, PathBuf)> = entries
        .iter()
        .map(|entry| (entry.clone(), server_dir.join(format!(".{}.restore", entry))))
        .collect();
    let discard = |staged: &[(String, PathBuf)]| {
        for (_, staging) in staged {
            let _ = remove_entry(staging);
        }
    };

    for (entry, staging) in &staged {
        remove_entry(staging)?;
        let mut report = CopyReport::default();
        copy_tree(&snapshot.join(entry), staging, &mut report);
        if let Some(failure) = report.failures.first() {
            discard(&staged);
            return Err(RestoreError::Staging {
                entry: entry.clone(),
                reason: failure.reason.clone(),
            });
        }
    }

    for (entry, staging) in &staged {
        let live = server_dir.join(entry);
        remove_entry(&live)?;
        fs::rename(staging, &live)?;
    }
    Ok(entries)
}
