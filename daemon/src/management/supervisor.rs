use ahash::RandomState;
use log::{info, warn};
use mcsm_protocol::event::{EventKind, LogOrigin, Severity};
use mcsm_protocol::management::instance::LifecycleState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::comm::process;
use super::config::SupervisorConfig;
use super::error::{StartError, StopError, WriteError};
use super::instance::ServerInstance;
use super::launch::LaunchCommand;
use crate::backup::{ConsoleHandle, ConsoleRegistry};
use crate::pipeline::{EventBus, Subscriptions};

fn registry_key(dir: &Path) -> PathBuf {
    std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf())
}

/// Owns every live server process, at most one per working directory.
pub struct Supervisor {
    by_dir: scc::HashMap<PathBuf, Arc<ServerInstance>, RandomState>,
    by_id: scc::HashMap<Uuid, Arc<ServerInstance>, RandomState>,
    bus: EventBus,
    subscriptions: Arc<Subscriptions>,
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, bus: EventBus, subscriptions: Arc<Subscriptions>) -> Self {
        Self {
            by_dir: scc::HashMap::with_hasher(RandomState::new()),
            by_id: scc::HashMap::with_hasher(RandomState::new()),
            bus,
            subscriptions,
            config,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn subscriptions(&self) -> &Arc<Subscriptions> {
        &self.subscriptions
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn is_stale(instance: &ServerInstance) -> bool {
        instance.has_exited() || instance.status().is_terminal()
    }

    /// Validates `command`, spawns the server and wires up its readers.
    pub async fn start(&self, command: LaunchCommand) -> Result<Arc<ServerInstance>, StartError> {
        let dir = registry_key(&command.working_dir());

        self.by_dir.remove_if(&dir, |instance| Self::is_stale(instance));
        if self.by_dir.contains(&dir) {
            return Err(StartError::AlreadyRunning(dir));
        }

        let resolved = command.validate()?;

        let instance = Arc::new(ServerInstance::new(
            command,
            dir.clone(),
            self.bus.clone(),
            Arc::clone(&self.subscriptions),
            self.config.clone(),
        ));
        if self.by_dir.insert(dir.clone(), Arc::clone(&instance)).is_err() {
            return Err(StartError::AlreadyRunning(dir));
        }
        let _ = self.by_id.insert(instance.id(), Arc::clone(&instance));
        // Idle -> Launching cannot fail on a fresh instance
        let _ = instance.transition(LifecycleState::Launching);

        let child = match process::spawn(instance.command(), &resolved) {
            Ok(child) => child,
            Err(err) => {
                let _ = instance.transition(LifecycleState::Stopped(None));
                self.bus
                    .daemon(
                        Some(instance.id()),
                        Severity::Error,
                        format!("failed to launch {}: {}", instance.name(), err),
                    )
                    .await;
                self.release(&instance);
                return Err(StartError::Spawn(err));
            }
        };

        instance.set_pid(child.id());
        let _ = instance.transition(LifecycleState::Starting);
        self.bus
            .publish(
                Some(instance.id()),
                LogOrigin::Daemon,
                Severity::Info,
                EventKind::Spawned { pid: instance.pid() },
                format!(
                    "launched {} (pid {})",
                    instance.name(),
                    instance.pid().map_or_else(|| "?".to_owned(), |p| p.to_string())
                ),
            )
            .await;
        process::attach(child, Arc::clone(&instance)).await;
        Ok(instance)
    }

    /// Drops the registry entries of `instance`, leaving a newer instance alone.
    pub fn release(&self, instance: &ServerInstance) {
        self.release_slot(instance);
        self.by_id.remove(&instance.id());
    }

    /// Frees the working directory but keeps the instance reachable by id
    /// until its exit has been dispatched.
    fn release_slot(&self, instance: &ServerInstance) {
        let id = instance.id();
        self.by_dir
            .remove_if(instance.working_dir(), |current| current.id() == id);
    }

    pub fn instance(&self, dir: &Path) -> Option<Arc<ServerInstance>> {
        self.by_dir.read(&registry_key(dir), |_, v| Arc::clone(v))
    }

    pub fn instance_by_id(&self, id: Uuid) -> Option<Arc<ServerInstance>> {
        self.by_id.read(&id, |_, v| Arc::clone(v))
    }

    pub fn instances(&self) -> Vec<Arc<ServerInstance>> {
        let mut all = vec![];
        self.by_id.scan(|_, v| all.push(Arc::clone(v)));
        all
    }

    pub fn status(&self, dir: &Path) -> LifecycleState {
        self.instance(dir)
            .map(|instance| instance.status())
            .unwrap_or_default()
    }

    /// A process exists (or is starting) for `dir`.
    pub fn is_live(&self, dir: &Path) -> bool {
        self.instance(dir)
            .is_some_and(|instance| !Self::is_stale(&instance))
    }

    pub async fn send_line(&self, dir: &Path, text: &str) -> Result<(), WriteError> {
        match self.instance(dir) {
            Some(instance) => instance.send_line(text).await,
            None => Err(WriteError::NotRunning),
        }
    }

    pub async fn stop(&self, dir: &Path, grace: Duration) -> Result<(), StopError> {
        let instance = self
            .instance(dir)
            .filter(|instance| !Self::is_stale(instance))
            .ok_or_else(|| StopError::NotRunning(dir.to_path_buf()))?;
        instance.stop(grace).await?;
        Ok(())
    }

    /// Stops the instance in `dir`, waits for the process to go away and
    /// frees the slot. An instance that never became ready only gets the
    /// short replace grace.
    pub async fn terminate(&self, dir: &Path) -> bool {
        let Some(instance) = self.instance(dir) else {
            return false;
        };
        if !instance.has_exited() {
            let grace = match instance.status() {
                LifecycleState::Running => self.config.stop_grace(),
                _ => self.config.replace_wait(),
            };
            info!("terminating {} before replacing it", instance.name());
            if let Err(err) = instance.stop(grace).await {
                warn!("could not stop {} cleanly ({}), killing", instance.name(), err);
                instance.kill();
            }
            instance.wait_exit().await;
        }
        self.release_slot(&instance);
        true
    }

    /// Stops every instance and waits for all of them to exit.
    pub async fn shutdown_all(&self) {
        let instances = self.instances();
        let waits = instances.iter().map(|instance| async move {
            if instance.has_exited() {
                return;
            }
            if instance.stop(self.config.stop_grace()).await.is_err() {
                instance.kill();
            }
            instance.wait_exit().await;
        });
        futures::future::join_all(waits).await;
    }
}

impl ConsoleRegistry for Supervisor {
    fn console_for(&self, dir: &Path) -> Option<Arc<dyn ConsoleHandle>> {
        self.instance(dir)
            .map(|instance| instance as Arc<dyn ConsoleHandle>)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::{
        cooperative_runtime, deaf_runtime, eventually, fast_supervisor, launch, server_dir,
        short_lived_runtime, stubborn_runtime, Harness,
    };
    use pretty_assertions::assert_eq;

    const WAIT: Duration = Duration::from_secs(10);

    async fn reaches(instance: &ServerInstance, state: LifecycleState) -> bool {
        eventually(WAIT, || instance.status() == state).await
    }

    #[tokio::test]
    async fn readiness_is_applied_once() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = server_dir(tmp.path(), "alpha");
        let harness = Harness::new(fast_supervisor(), None);

        let instance = harness
            .supervisor
            .start(launch(cooperative_runtime(), &dir))
            .await
            .unwrap();
        assert!(instance.pid().is_some());
        assert!(reaches(&instance, LifecycleState::Running).await);
        assert!(instance.is_ready());

        instance.send_line("again").await.unwrap();
        assert!(
            eventually(WAIT, || harness
                .events()
                .iter()
                .any(|e| e.text.contains("Done (0.5s)")))
            .await
        );
        let became_running = harness
            .states()
            .iter()
            .filter(|change| change.to == LifecycleState::Running)
            .count();
        assert_eq!(became_running, 1);
        assert_eq!(instance.status(), LifecycleState::Running);

        harness.supervisor.stop(&dir, Duration::from_secs(2)).await.unwrap();
        assert!(reaches(&instance, LifecycleState::Stopped(Some(0))).await);
        let path: Vec<LifecycleState> = harness.states().iter().map(|c| c.to).collect();
        assert_eq!(
            path,
            vec![
                LifecycleState::Launching,
                LifecycleState::Starting,
                LifecycleState::Running,
                LifecycleState::Stopping,
                LifecycleState::Stopped(Some(0)),
            ]
        );
    }

    #[tokio::test]
    async fn chat_quoting_a_stop_message_keeps_the_server_running() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = server_dir(tmp.path(), "chatty");
        let harness = Harness::new(fast_supervisor(), None);

        let instance = harness
            .supervisor
            .start(launch(cooperative_runtime(), &dir))
            .await
            .unwrap();
        assert!(reaches(&instance, LifecycleState::Running).await);

        let chat = "[12:00:00] [Server thread/INFO]: <Steve> Stopping the server lol";
        instance.send_line(chat).await.unwrap();
        assert!(eventually(WAIT, || harness.events().iter().any(|e| e.text == chat)).await);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(instance.status(), LifecycleState::Running);
        assert!(!instance.has_exited());
        assert!(!instance.shutdown_signal().is_raised());

        harness.supervisor.stop(&dir, Duration::from_secs(2)).await.unwrap();
        assert!(reaches(&instance, LifecycleState::Stopped(Some(0))).await);
    }

    #[tokio::test]
    async fn stubborn_server_is_force_killed() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = server_dir(tmp.path(), "stubborn");
        let harness = Harness::new(fast_supervisor(), None);

        let instance = harness
            .supervisor
            .start(launch(stubborn_runtime(), &dir))
            .await
            .unwrap();
        assert!(reaches(&instance, LifecycleState::Running).await);

        harness
            .supervisor
            .stop(&dir, Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(instance.status(), LifecycleState::Stopping);
        assert!(reaches(&instance, LifecycleState::Stopped(None)).await);

        let events = harness.events();
        let killed = events
            .iter()
            .position(|e| e.kind == EventKind::ForceKilled)
            .expect("force kill reported");
        let exited = events
            .iter()
            .position(|e| matches!(e.kind, EventKind::Exited { .. }))
            .expect("exit reported");
        assert!(killed < exited);
        assert!(eventually(WAIT, || harness.supervisor.instance(&dir).is_none()).await);
    }

    #[tokio::test]
    async fn inverted_heap_is_rejected_before_spawn() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = server_dir(tmp.path(), "heap");
        let harness = Harness::new(fast_supervisor(), None);

        let command = launch(cooperative_runtime(), &dir).with_heap("2G", "1G");
        let err = harness.supervisor.start(command).await.unwrap_err();
        assert!(matches!(err, StartError::InvalidConfig(_)));
        assert!(harness.supervisor.instance(&dir).is_none());
        assert!(harness.supervisor.instances().is_empty());

        let command = launch(cooperative_runtime(), &dir).with_heap("lots", "1G");
        assert!(matches!(
            harness.supervisor.start(command).await,
            Err(StartError::InvalidConfig(_))
        ));
        assert!(harness.states().is_empty());
    }

    #[tokio::test]
    async fn missing_artifact_and_runtime() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = server_dir(tmp.path(), "missing");
        let harness = Harness::new(fast_supervisor(), None);

        let command = LaunchCommand::new(cooperative_runtime(), dir.join("paper.jar"));
        assert!(matches!(
            harness.supervisor.start(command).await,
            Err(StartError::MissingExecutable(_))
        ));

        let command = launch(
            tmp.path().join("no-such-java").to_string_lossy().into_owned(),
            &dir,
        );
        assert!(matches!(
            harness.supervisor.start(command).await,
            Err(StartError::RuntimeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn spawn_failure_releases_the_slot() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = server_dir(tmp.path(), "noexec");
        let runtime = tmp.path().join("java");
        std::fs::write(&runtime, b"not a program").unwrap();
        let harness = Harness::new(fast_supervisor(), None);

        let command = launch(runtime.to_string_lossy().into_owned(), &dir);
        assert!(matches!(
            harness.supervisor.start(command).await,
            Err(StartError::Spawn(_))
        ));
        assert!(harness.supervisor.instance(&dir).is_none());
        assert!(eventually(WAIT, || harness
            .events()
            .iter()
            .any(|e| e.severity == Severity::Error && e.text.contains("failed to launch")))
        .await);
    }

    #[tokio::test]
    async fn one_instance_per_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = server_dir(tmp.path(), "single");
        let harness = Harness::new(fast_supervisor(), None);

        let first = harness
            .supervisor
            .start(launch(cooperative_runtime(), &dir))
            .await
            .unwrap();
        let err = harness
            .supervisor
            .start(launch(cooperative_runtime(), &dir))
            .await
            .unwrap_err();
        assert!(matches!(err, StartError::AlreadyRunning(_)));

        assert!(harness.supervisor.terminate(&dir).await);
        assert!(first.has_exited());
        let second = harness
            .supervisor
            .start(launch(cooperative_runtime(), &dir))
            .await
            .unwrap();
        assert_ne!(first.id(), second.id());
        assert!(reaches(&second, LifecycleState::Running).await);
        assert!(reaches(&first, LifecycleState::Stopped(Some(0))).await);

        harness.supervisor.shutdown_all().await;
        assert!(second.has_exited());
    }

    #[tokio::test]
    async fn timed_out_write_closes_the_console_input() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = server_dir(tmp.path(), "deaf");
        let harness = Harness::new(fast_supervisor(), None);

        let instance = harness
            .supervisor
            .start(launch(deaf_runtime(), &dir))
            .await
            .unwrap();
        assert!(reaches(&instance, LifecycleState::Running).await);

        // larger than any pipe buffer, so the write stalls halfway
        let long_line = "x".repeat(1 << 20);
        assert!(matches!(
            instance.send_line(&long_line).await,
            Err(WriteError::Timeout(_))
        ));
        // nothing may be appended to the half-written line
        assert!(matches!(
            instance.send_line("save-on").await,
            Err(WriteError::NotRunning)
        ));
        assert!(!instance.has_exited());

        harness.supervisor.stop(&dir, Duration::from_secs(1)).await.unwrap();
        assert!(eventually(WAIT, || instance.has_exited()).await);
        assert!(reaches(&instance, LifecycleState::Stopped(None)).await);
    }

    #[tokio::test]
    async fn writes_fail_once_the_process_is_gone() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = server_dir(tmp.path(), "short");
        let harness = Harness::new(fast_supervisor(), None);

        let instance = harness
            .supervisor
            .start(launch(short_lived_runtime(), &dir))
            .await
            .unwrap();
        assert_eq!(instance.wait_exit().await, Some(7));
        assert!(matches!(
            instance.send_line("list").await,
            Err(WriteError::NotRunning)
        ));
        assert!(reaches(&instance, LifecycleState::Stopped(Some(7))).await);
        assert!(!instance.is_ready());

        assert!(eventually(WAIT, || harness.supervisor.instance(&dir).is_none()).await);
        assert!(matches!(
            harness.supervisor.send_line(&dir, "list").await,
            Err(WriteError::NotRunning)
        ));
        assert!(matches!(
            harness.supervisor.stop(&dir, Duration::from_secs(1)).await,
            Err(StopError::NotRunning(_))
        ));
        assert_eq!(harness.supervisor.status(&dir), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn stderr_lines_and_exit_code_are_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = server_dir(tmp.path(), "crashy");
        let harness = Harness::new(fast_supervisor(), None);

        let instance = harness
            .supervisor
            .start(launch(cooperative_runtime(), &dir))
            .await
            .unwrap();
        assert!(reaches(&instance, LifecycleState::Running).await);
        instance.send_line("crash").await.unwrap();
        assert!(reaches(&instance, LifecycleState::Stopped(Some(3))).await);

        let events = harness.events();
        let boom = events.iter().position(|e| e.text == "boom").unwrap();
        assert_eq!(events[boom].severity, Severity::Warn);
        assert_eq!(events[boom].origin, LogOrigin::Console);
        let exited = events
            .iter()
            .position(|e| e.kind == EventKind::Exited { code: Some(3) })
            .unwrap();
        assert!(boom < exited);

        let mut seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        seqs.sort();
        seqs.dedup();
        assert_eq!(seqs.len(), events.len());
    }

    #[tokio::test]
    async fn roster_follows_join_and_leave() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = server_dir(tmp.path(), "players");
        let harness = Harness::new(fast_supervisor(), None);

        let instance = harness
            .supervisor
            .start(launch(cooperative_runtime(), &dir))
            .await
            .unwrap();
        assert!(reaches(&instance, LifecycleState::Running).await);
        for line in ["join Alex", "join Steve", "leave Alex"] {
            instance.send_line(line).await.unwrap();
        }
        assert!(eventually(WAIT, || instance.players() == vec!["Steve".to_owned()]).await);
        let last = harness.rosters().last().cloned().unwrap();
        assert_eq!(last.instance, instance.id());
        assert_eq!(last.players, vec!["Steve".to_owned()]);

        harness.supervisor.stop(&dir, Duration::from_secs(2)).await.unwrap();
        assert!(reaches(&instance, LifecycleState::Stopped(Some(0))).await);
        assert!(eventually(WAIT, || instance.players().is_empty()).await);
        assert!(eventually(WAIT, || harness
            .rosters()
            .last()
            .is_some_and(|change| change.players.is_empty()))
        .await);
    }

    #[tokio::test]
    async fn console_transcript_is_written() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = server_dir(tmp.path(), "logged");
        let logs = tmp.path().join("logs");
        let harness = Harness::new(fast_supervisor(), Some(logs.clone()));

        let instance = harness
            .supervisor
            .start(launch(cooperative_runtime(), &dir))
            .await
            .unwrap();
        assert!(reaches(&instance, LifecycleState::Running).await);
        harness.supervisor.stop(&dir, Duration::from_secs(2)).await.unwrap();
        assert!(reaches(&instance, LifecycleState::Stopped(Some(0))).await);

        let transcript = || -> Option<String> {
            let entry = std::fs::read_dir(&logs).ok()?.filter_map(Result::ok).next()?;
            std::fs::read_to_string(entry.path()).ok()
        };
        assert!(eventually(WAIT, || transcript()
            .is_some_and(|text| text.contains("Done (1.234s)") && text.contains("exited with code 0")))
        .await);
        let name = std::fs::read_dir(&logs)
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .file_name()
            .to_string_lossy()
            .into_owned();
        assert!(name.starts_with("console-") && name.ends_with(".log"));
    }
}
