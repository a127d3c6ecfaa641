//! Shared fixtures for in-crate tests.

use async_trait::async_trait;
use mcsm_protocol::event::{LogEvent, RosterChange, StateChange};
use mcsm_protocol::management::instance::LifecycleState;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::backup::{ConsoleHandle, ConsoleRegistry};
use crate::management::{Supervisor, SupervisorConfig, WriteError};
use crate::pipeline::{channel, DispatchConfig, Dispatcher, Subscriptions};
use crate::utils::{StopSignal, TListener};

/// Console that records what it was sent.
pub struct MockConsole {
    state: Mutex<LifecycleState>,
    sent: Mutex<Vec<String>>,
}

impl MockConsole {
    pub fn new(state: LifecycleState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            sent: Mutex::new(vec![]),
        })
    }

    pub fn set_state(&self, state: LifecycleState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConsoleHandle for MockConsole {
    fn instance_id(&self) -> Option<Uuid> {
        None
    }

    fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap()
    }

    async fn send_line(&self, text: &str) -> Result<(), WriteError> {
        self.sent.lock().unwrap().push(text.to_owned());
        Ok(())
    }
}

/// Hands out the same console for every directory.
#[derive(Default)]
pub struct MockRegistry {
    console: Mutex<Option<Arc<MockConsole>>>,
}

impl MockRegistry {
    pub fn set(&self, console: Option<Arc<MockConsole>>) {
        *self.console.lock().unwrap() = console;
    }
}

impl ConsoleRegistry for MockRegistry {
    fn console_for(&self, _dir: &Path) -> Option<Arc<dyn ConsoleHandle>> {
        self.console
            .lock()
            .unwrap()
            .clone()
            .map(|console| console as Arc<dyn ConsoleHandle>)
    }
}

/// Polls `check` every 20 ms until it holds or `within` runs out.
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// A supervisor with a fast dispatch loop whose subscriptions are recorded.
pub struct Harness {
    pub supervisor: Arc<Supervisor>,
    events: Arc<Mutex<Vec<LogEvent>>>,
    states: Arc<Mutex<Vec<StateChange>>>,
    rosters: Arc<Mutex<Vec<RosterChange>>>,
    stop: StopSignal,
}

impl Harness {
    pub fn new(config: SupervisorConfig, transcript_dir: Option<PathBuf>) -> Self {
        let dispatch = DispatchConfig {
            interval_ms: 20,
            ..Default::default()
        };
        let (bus, rx) = channel(dispatch.bus_capacity);
        let subscriptions = Arc::new(Subscriptions::new());
        let events = Arc::new(Mutex::new(vec![]));
        let states = Arc::new(Mutex::new(vec![]));
        let rosters = Arc::new(Mutex::new(vec![]));
        {
            let events = events.clone();
            subscriptions.on_event.add_sync_listener(
                move |event| events.lock().unwrap().push(event),
                TListener::default(),
            );
            let states = states.clone();
            subscriptions.on_state_change.add_sync_listener(
                move |change| states.lock().unwrap().push(change),
                TListener::default(),
            );
            let rosters = rosters.clone();
            subscriptions.on_roster_change.add_sync_listener(
                move |change| rosters.lock().unwrap().push(change),
                TListener::default(),
            );
        }

        let supervisor = Arc::new(Supervisor::new(config, bus, subscriptions));
        let stop = StopSignal::new();
        let dispatcher = Dispatcher::new(rx, supervisor.clone(), &dispatch, transcript_dir);
        tokio::spawn(dispatcher.run(stop.clone()));
        Self {
            supervisor,
            events,
            states,
            rosters,
            stop,
        }
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<StateChange> {
        self.states.lock().unwrap().clone()
    }

    pub fn rosters(&self) -> Vec<RosterChange> {
        self.rosters.lock().unwrap().clone()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.stop.raise();
    }
}

/// Quick timeouts so process tests finish fast.
pub fn fast_supervisor() -> SupervisorConfig {
    SupervisorConfig {
        stop_grace_secs: 2,
        write_timeout_ms: 1000,
        replace_wait_secs: 1,
        reader_drain_ms: 500,
    }
}

#[cfg(unix)]
pub use fake::*;

#[cfg(unix)]
mod fake {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::LazyLock;

    use crate::management::LaunchCommand;

    /// Prints the readiness line, then answers console commands like a
    /// vanilla server would.
    const COOPERATIVE: &str = r#"#!/bin/sh
echo "[00:00:00] [Server thread/INFO]: Starting minecraft server version 1.20.4"
echo "[00:00:01] [Server thread/INFO]: Done (1.234s)! For help, type \"help\""
while IFS= read -r line; do
  case "$line" in
    stop)
      echo "[00:00:09] [Server thread/INFO]: Stopping the server"
      exit 0 ;;
    save-all) echo "[00:00:02] [Server thread/INFO]: Saved the game" ;;
    again) echo "[00:00:03] [Server thread/INFO]: Done (0.5s)!" ;;
    join\ *) echo "[00:00:04] [Server thread/INFO]: ${line#join } joined the game" ;;
    leave\ *) echo "[00:00:05] [Server thread/INFO]: ${line#leave } left the game" ;;
    crash) echo "boom" >&2; exit 3 ;;
    *) echo "$line" ;;
  esac
done
"#;

    /// Becomes ready but ignores `stop`.
    const STUBBORN: &str = r#"#!/bin/sh
echo "[00:00:01] [Server thread/INFO]: Done (1.0s)!"
while true; do
  read -r line || sleep 1
done
"#;

    /// Becomes ready and never reads its console input.
    const DEAF: &str = r#"#!/bin/sh
echo "[00:00:01] [Server thread/INFO]: Done (1.0s)!"
exec sleep 60
"#;

    /// Exits right away without becoming ready.
    const SHORT_LIVED: &str = r#"#!/bin/sh
echo "starting"
exit 7
"#;

    static SCRIPTS: LazyLock<tempfile::TempDir> = LazyLock::new(|| {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in [
            ("cooperative.sh", COOPERATIVE),
            ("stubborn.sh", STUBBORN),
            ("short-lived.sh", SHORT_LIVED),
            ("deaf.sh", DEAF),
        ] {
            let path = dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    });

    fn script(name: &str) -> String {
        SCRIPTS.path().join(name).to_string_lossy().into_owned()
    }

    pub fn cooperative_runtime() -> String {
        script("cooperative.sh")
    }

    pub fn stubborn_runtime() -> String {
        script("stubborn.sh")
    }

    pub fn deaf_runtime() -> String {
        script("deaf.sh")
    }

    pub fn short_lived_runtime() -> String {
        script("short-lived.sh")
    }

    /// `<parent>/<name>/server.jar` plus a small world.
    pub fn server_dir(parent: &Path, name: &str) -> PathBuf {
        let dir = parent.join(name);
        std::fs::create_dir_all(dir.join("world").join("region")).unwrap();
        std::fs::write(dir.join("world").join("level.dat"), b"level").unwrap();
        std::fs::write(dir.join("world").join("region").join("r.0.0.mca"), b"chunk").unwrap();
        std::fs::write(dir.join("server.jar"), b"jar").unwrap();
        dir
    }

    pub fn launch(runtime: String, server_dir: &Path) -> LaunchCommand {
        LaunchCommand::new(runtime, server_dir.join("server.jar")).with_heap("256M", "512M")
    }
}
