use log::{debug, info};
use mcsm_protocol::backup::{RetentionPolicy, TriggerKind};
use mcsm_protocol::management::instance::{BackupExtras, LifecycleState, ServerSettings};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::task::JoinHandle;

use super::engine::BackupEngine;
use crate::utils::StopSignal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodicSchedule {
    pub interval: Duration,
    pub retention: RetentionPolicy,
    pub extras: BackupExtras,
}

impl PeriodicSchedule {
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            interval: Duration::from_secs(u64::from(settings.backup_interval_minutes.max(1)) * 60),
            retention: settings.retention(),
            extras: settings.extras.clone(),
        }
    }
}

/// Background loop taking a snapshot every `interval` while the server runs.
pub struct PeriodicBackup {
    stop: StopSignal,
    handle: JoinHandle<()>,
}

impl PeriodicBackup {
    /// The loop ends once `stop` is raised; the instance's shutdown signal
    /// ties it to the server's lifetime.
    pub fn spawn(
        engine: Arc<BackupEngine>,
        server_dir: PathBuf,
        schedule: PeriodicSchedule,
        stop: StopSignal,
    ) -> Self {
        let handle = tokio::spawn(run(engine, server_dir, schedule, stop.clone()));
        Self { stop, handle }
    }

    pub fn stop(&self) {
        self.stop.raise();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn join(self) {
        self.stop.raise();
        let _ = self.handle.await;
    }
}

async fn run(
    engine: Arc<BackupEngine>,
    server_dir: PathBuf,
    schedule: PeriodicSchedule,
    stop: StopSignal,
) {
    let tick = engine.config().periodic_tick();
    let mut waited = Duration::ZERO;
    info!(
        "periodic backup of {:?} every {}s, keeping {}",
        server_dir,
        schedule.interval.as_secs(),
        schedule.retention.keep_count()
    );

    loop {
        select! {
            biased;
            _ = stop.raised() => break,
            _ = tokio::time::sleep(tick) => {}
        }
        waited += tick;
        if waited < schedule.interval {
            continue;
        }
        waited = Duration::ZERO;

        if engine.console_state(&server_dir) != Some(LifecycleState::Running) {
            debug!("skipping periodic backup of {:?}: server not running", server_dir);
            continue;
        }
        let _ = engine
            .run_job(
                &server_dir,
                TriggerKind::Periodic,
                &schedule.extras,
                schedule.retention,
            )
            .await;
    }
    debug!("periodic backup of {:?} stopped", server_dir);
}
