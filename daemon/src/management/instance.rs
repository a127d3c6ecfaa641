use async_trait::async_trait;
use chrono::{DateTime, Local};
use log::info;
use mcsm_protocol::event::{EventKind, LogOrigin, Severity, StateChange};
use mcsm_protocol::management::instance::LifecycleState;
use mcsm_protocol::utils::Encoding;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::watch;
use uuid::Uuid;

use super::config::SupervisorConfig;
use super::error::{TransitionError, WriteError};
use super::launch::LaunchCommand;
use super::roster::PlayerRoster;
use super::state::StateCell;
use crate::backup::ConsoleHandle;
use crate::pipeline::{EventBus, Subscriptions};
use crate::utils::StopSignal;

pub const STOP_COMMAND: &str = "stop";

/// One external server process under management.
pub struct ServerInstance {
    id: Uuid,
    name: String,
    working_dir: PathBuf,
    command: LaunchCommand,
    started_at: DateTime<Local>,
    pid: AtomicU32,
    state: StateCell,
    ready: AtomicBool,
    roster: Mutex<PlayerRoster>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    /// Raised to make the exit monitor kill the process.
    kill: StopSignal,
    /// Raised when output readers must give up.
    readers_stop: StopSignal,
    /// Raised once a stop is requested or the process is gone.
    shutdown: StopSignal,
    exit: watch::Sender<Option<Option<i32>>>,
    bus: EventBus,
    subscriptions: Arc<Subscriptions>,
    config: SupervisorConfig,
}

impl std::fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("working_dir", &self.working_dir)
            .finish_non_exhaustive()
    }
}

impl ServerInstance {
    pub(crate) fn new(
        command: LaunchCommand,
        working_dir: PathBuf,
        bus: EventBus,
        subscriptions: Arc<Subscriptions>,
        config: SupervisorConfig,
    ) -> Self {
        let name = working_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| working_dir.to_string_lossy().into_owned());
        let (exit, _) = watch::channel(None);
        Self {
            id: Uuid::new_v4(),
            name,
            working_dir,
            command,
            started_at: Local::now(),
            pid: AtomicU32::new(0),
            state: StateCell::default(),
            ready: AtomicBool::new(false),
            roster: Mutex::new(PlayerRoster::new()),
            stdin: tokio::sync::Mutex::new(None),
            kill: StopSignal::new(),
            readers_stop: StopSignal::new(),
            shutdown: StopSignal::new(),
            exit,
            bus,
            subscriptions,
            config,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn command(&self) -> &LaunchCommand {
        &self.command
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::Relaxed) {
            0 => None,
            pid => Some(pid),
        }
    }

    pub fn status(&self) -> LifecycleState {
        self.state.get()
    }

    pub fn players(&self) -> Vec<String> {
        self.roster.lock().unwrap_or_else(|e| e.into_inner()).players()
    }

    pub fn input_encoding(&self) -> Encoding {
        self.command.input_encoding
    }

    pub fn shutdown_signal(&self) -> StopSignal {
        self.shutdown.clone()
    }

    pub(crate) fn readers_stop(&self) -> StopSignal {
        self.readers_stop.clone()
    }

    pub(crate) fn kill_signal(&self) -> StopSignal {
        self.kill.clone()
    }

    pub(crate) fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub(crate) fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub(crate) fn set_pid(&self, pid: Option<u32>) {
        self.pid.store(pid.unwrap_or(0), Ordering::Relaxed);
    }

    pub(crate) async fn attach_stdin(&self, stdin: Option<ChildStdin>) {
        *self.stdin.lock().await = stdin;
    }

    pub(crate) async fn release_stdin(&self) {
        self.stdin.lock().await.take();
    }

    /// Applies a state change and notifies `on_state_change` listeners.
    pub fn transition(&self, to: LifecycleState) -> Result<LifecycleState, TransitionError> {
        let from = self.state.transition(to)?;
        self.announce(from, to);
        Ok(from)
    }

    pub(crate) fn transition_from(
        &self,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<(), TransitionError> {
        self.state.transition_from(from, to)?;
        self.announce(from, to);
        Ok(())
    }

    fn announce(&self, from: LifecycleState, to: LifecycleState) {
        info!("server {} ({}): {} -> {}", self.name, self.id, from, to);
        if to.is_terminal() || to == LifecycleState::Stopping {
            self.shutdown.raise();
        }
        self.subscriptions.on_state_change.invoke(StateChange {
            instance: self.id,
            server: self.name.clone(),
            from,
            to,
        });
    }

    /// First readiness marker moves `Starting -> Running`; later ones are ignored.
    pub(crate) fn mark_ready(&self) -> bool {
        if self.ready.load(Ordering::SeqCst) {
            return false;
        }
        match self.transition_from(LifecycleState::Starting, LifecycleState::Running) {
            Ok(()) => {
                self.ready.store(true, Ordering::SeqCst);
                true
            }
            Err(_) => false,
        }
    }

    /// Whether the readiness marker has been seen.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub(crate) fn with_roster<R>(&self, f: impl FnOnce(&mut PlayerRoster) -> R) -> R {
        let mut roster = self.roster.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut roster)
    }

    pub(crate) fn mark_exited(&self, code: Option<i32>) {
        self.exit.send_replace(Some(code));
        self.shutdown.raise();
    }

    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    pub fn exit_code(&self) -> Option<Option<i32>> {
        *self.exit.borrow()
    }

    /// Resolves with the exit code once the process is gone.
    pub async fn wait_exit(&self) -> Option<i32> {
        let mut rx = self.exit.subscribe();
        let result = match rx.wait_for(|exit| exit.is_some()).await {
            Ok(exit) => {
                let code = *exit;
                code.flatten()
            }
            Err(_) => None,
        };
        result
    }

    /// Writes `text` plus a newline to the server console.
    ///
    /// Failures are also reported on the event bus.
    pub async fn send_line(&self, text: &str) -> Result<(), WriteError> {
        let result = self.write_line(text).await;
        if let Err(err) = &result {
            self.bus
                .daemon(
                    Some(self.id),
                    Severity::Warn,
                    format!("could not send `{}`: {}", text, err),
                )
                .await;
        }
        result
    }

    async fn write_line(&self, text: &str) -> Result<(), WriteError> {
        if self.has_exited() {
            return Err(WriteError::NotRunning);
        }
        let mut bytes = self.command.input_encoding.encode_lossy(text);
        bytes.push(b'\n');

        let timeout = self.config.write_timeout();
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(WriteError::NotRunning)?;
        let write = async {
            stdin.write_all(&bytes).await?;
            stdin.flush().await
        };
        match tokio::time::timeout(timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                guard.take();
                Err(WriteError::Io(err))
            }
            Err(_) => {
                // part of the line may already be in the pipe
                guard.take();
                Err(WriteError::Timeout(timeout))
            }
        }
    }

    /// Asks the server to stop; kills it if it is still alive after `grace`.
    pub async fn stop(self: &Arc<Self>, grace: Duration) -> Result<(), TransitionError> {
        match self.status() {
            LifecycleState::Stopping => {}
            LifecycleState::Starting | LifecycleState::Running => {
                self.transition(LifecycleState::Stopping)?;
            }
            other => {
                return Err(TransitionError {
                    from: other,
                    to: LifecycleState::Stopping,
                })
            }
        }

        if let Err(err) = self.write_line(STOP_COMMAND).await {
            self.bus
                .publish(
                    Some(self.id),
                    LogOrigin::Daemon,
                    Severity::Warn,
                    EventKind::ForceKilled,
                    format!("could not send stop ({}), terminating server", err),
                )
                .await;
            self.kill.raise();
            return Ok(());
        }

        let instance = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::time::timeout(grace, instance.wait_exit()).await.is_err() {
                instance
                    .bus
                    .publish(
                        Some(instance.id),
                        LogOrigin::Daemon,
                        Severity::Warn,
                        EventKind::ForceKilled,
                        format!(
                            "server did not stop within {}s, terminating",
                            grace.as_secs_f32()
                        ),
                    )
                    .await;
                instance.kill.raise();
            }
        });
        Ok(())
    }

    /// Terminates the process without asking.
    pub fn kill(&self) {
        self.shutdown.raise();
        self.kill.raise();
    }
}

#[async_trait]
impl ConsoleHandle for ServerInstance {
    fn instance_id(&self) -> Option<Uuid> {
        Some(self.id)
    }

    fn state(&self) -> LifecycleState {
        match (self.status(), self.exit_code()) {
            (state, Some(code)) if state.is_live() => LifecycleState::Stopped(code),
            (state, _) => state,
        }
    }

    async fn send_line(&self, text: &str) -> Result<(), WriteError> {
        ServerInstance::send_line(self, text).await
    }
}
