use ahash::RandomState;
use log::{info, warn};
use mcsm_protocol::backup::{BackupRecord, TriggerKind};
use mcsm_protocol::management::instance::{LifecycleState, ServerSettings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::error::{StartError, StopError, WriteError};
use super::instance::ServerInstance;
use super::launch::LaunchCommand;
use super::supervisor::Supervisor;
use crate::backup::{
    BackupEngine, BackupError, ConsoleRegistry, PeriodicBackup, PeriodicSchedule, RestoreError,
};
use crate::config::AppConfig;
use crate::pipeline::{channel, Dispatcher, Subscriptions};
use crate::storage::{find_server_jar, SettingsStore};
use crate::utils::StopSignal;

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Front door of the daemon: resolves per-server settings and ties the
/// supervisor, the backup engine and the dispatch loop together.
pub struct ServerManager {
    config: AppConfig,
    supervisor: Arc<Supervisor>,
    engine: Arc<BackupEngine>,
    settings: SettingsStore,
    periodic: scc::HashMap<PathBuf, PeriodicBackup, RandomState>,
    dispatch_stop: StopSignal,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl ServerManager {
    /// Builds the manager and spawns its dispatch loop on the current runtime.
    pub fn new(config: AppConfig) -> Arc<Self> {
        let (bus, rx) = channel(config.dispatch.bus_capacity);
        let subscriptions = Arc::new(Subscriptions::new());
        let supervisor = Arc::new(Supervisor::new(
            config.supervisor.clone(),
            bus.clone(),
            subscriptions,
        ));
        let consoles: Arc<dyn ConsoleRegistry> = supervisor.clone();
        let engine = Arc::new(BackupEngine::new(
            config.backup_root.clone(),
            config.infrastructure_names(),
            config.backup.clone(),
            bus.clone(),
            consoles,
        ));

        let transcript_dir = config.console_transcript.then(|| config.log_dir.clone());
        let dispatcher = Dispatcher::new(rx, supervisor.clone(), &config.dispatch, transcript_dir);
        let dispatch_stop = StopSignal::new();
        let handle = tokio::spawn(dispatcher.run(dispatch_stop.clone()));

        Arc::new(Self {
            settings: SettingsStore::new(config.settings_dir.clone()),
            config,
            supervisor,
            engine,
            periodic: scc::HashMap::with_hasher(RandomState::new()),
            dispatch_stop,
            dispatcher: Mutex::new(Some(handle)),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn subscriptions(&self) -> &Arc<Subscriptions> {
        self.supervisor.subscriptions()
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    pub fn engine(&self) -> &Arc<BackupEngine> {
        &self.engine
    }

    pub fn settings(&self, server_dir: &Path) -> anyhow::Result<ServerSettings> {
        self.settings.load(server_dir)
    }

    pub fn save_settings(&self, server_dir: &Path, settings: &ServerSettings) -> anyhow::Result<()> {
        self.settings.save(server_dir, settings)
    }

    fn artifact(server_dir: &Path, settings: &ServerSettings) -> Result<PathBuf, StartError> {
        match settings.jar.as_deref().filter(|jar| !jar.trim().is_empty()) {
            Some(jar) => Ok(server_dir.join(jar)),
            None => find_server_jar(server_dir)
                .ok_or_else(|| StartError::MissingExecutable(server_dir.join("server.jar"))),
        }
    }

    /// Launches the server in `server_dir`.
    ///
    /// With `force`, a live instance is stopped and replaced instead of
    /// failing with `AlreadyRunning`. The startup backup, when enabled, is
    /// taken before the process starts; its failure does not block the launch.
    pub async fn start(&self, server_dir: &Path, force: bool) -> Result<Arc<ServerInstance>, StartError> {
        let server_dir = absolute(server_dir);
        let settings = self.settings.load_or_default(&server_dir);
        let command = LaunchCommand::from_settings(Self::artifact(&server_dir, &settings)?, &settings);
        let working_dir = command.working_dir();

        if self.supervisor.is_live(&working_dir) {
            if !force {
                return Err(StartError::AlreadyRunning(working_dir));
            }
            self.stop_periodic(&working_dir);
            self.supervisor.terminate(&working_dir).await;
        }
        command.validate()?;

        if settings.startup_backup {
            if let Err(err) = self
                .engine
                .run_job(&working_dir, TriggerKind::Startup, &settings.extras, settings.retention())
                .await
            {
                warn!("starting {:?} without a startup snapshot: {}", working_dir, err);
            }
        }

        let instance = self.supervisor.start(command).await?;
        if settings.periodic_backup {
            self.stop_periodic(&working_dir);
            let job = PeriodicBackup::spawn(
                Arc::clone(&self.engine),
                working_dir.clone(),
                PeriodicSchedule::from_settings(&settings),
                instance.shutdown_signal(),
            );
            let _ = self.periodic.insert(working_dir, job);
        }
        Ok(instance)
    }

    fn stop_periodic(&self, server_dir: &Path) {
        if let Some((_, job)) = self.periodic.remove(server_dir) {
            job.stop();
        }
    }

    pub async fn stop(&self, server_dir: &Path) -> Result<(), StopError> {
        let server_dir = absolute(server_dir);
        self.stop_periodic(&server_dir);
        self.supervisor
            .stop(&server_dir, self.config.supervisor.stop_grace())
            .await
    }

    pub async fn send_line(&self, server_dir: &Path, text: &str) -> Result<(), WriteError> {
        self.supervisor.send_line(server_dir, text).await
    }

    pub fn status(&self, server_dir: &Path) -> LifecycleState {
        self.supervisor.status(server_dir)
    }

    pub fn players(&self, server_dir: &Path) -> Vec<String> {
        self.supervisor
            .instance(server_dir)
            .map(|instance| instance.players())
            .unwrap_or_default()
    }

    /// Starts a manual backup in the background. Completion is reported as
    /// `backup_finished` on the bus; the handle is for callers that want to wait.
    pub fn backup_now(&self, server_dir: &Path) -> JoinHandle<Result<BackupRecord, BackupError>> {
        let server_dir = absolute(server_dir);
        let settings = self.settings.load_or_default(&server_dir);
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            engine
                .run_job(&server_dir, TriggerKind::Manual, &settings.extras, settings.retention())
                .await
        })
    }

    pub async fn restore(&self, server_dir: &Path, record: &BackupRecord) -> Result<(), RestoreError> {
        self.engine.restore(server_dir, record).await
    }

    pub fn list_snapshots(&self, server_dir: &Path) -> Vec<BackupRecord> {
        self.engine.list_snapshots(server_dir)
    }

    pub fn delete_snapshot(&self, record: &BackupRecord) -> std::io::Result<()> {
        self.engine.delete_snapshot(record)
    }

    /// Stops every server, then the dispatch loop once the exits are drained.
    pub async fn shutdown(&self) {
        let mut cancelled = 0;
        self.periodic.retain(|_, job| {
            job.stop();
            cancelled += 1;
            false
        });
        self.supervisor.shutdown_all().await;

        self.dispatch_stop.raise();
        if let Some(handle) = self.dispatcher.lock().await.take() {
            let _ = handle.await;
        }
        info!("server manager stopped, {} periodic backup(s) cancelled", cancelled);
    }
}
