use log::debug;
use mcsm_protocol::event::{EventKind, LogEvent, LogOrigin, RosterChange, Severity, StateChange};
use mcsm_protocol::management::instance::LifecycleState;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::bus::{EventBus, EventReceiver};
use super::config::DispatchConfig;
use super::transcript::ConsoleTranscript;
use crate::management::matchers::{classify, LineMatch};
use crate::management::{ServerInstance, Supervisor};
use crate::utils::{EventHub, StopSignal};

/// Listener hubs the presentation layer subscribes to.
#[derive(Default)]
pub struct Subscriptions {
    pub on_event: EventHub<LogEvent>,
    pub on_state_change: EventHub<StateChange>,
    pub on_roster_change: EventHub<RosterChange>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Single consumer of the event bus.
///
/// Applies output-driven state transitions and roster updates, keeps the
/// console transcripts and fans every event out to `on_event`.
pub struct Dispatcher {
    rx: EventReceiver,
    bus: EventBus,
    supervisor: Arc<Supervisor>,
    subscriptions: Arc<Subscriptions>,
    interval: Duration,
    batch: usize,
    transcript_dir: Option<PathBuf>,
    transcripts: HashMap<Uuid, ConsoleTranscript>,
}

impl Dispatcher {
    pub fn new(
        rx: EventReceiver,
        supervisor: Arc<Supervisor>,
        config: &DispatchConfig,
        transcript_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            rx,
            bus: supervisor.bus().clone(),
            subscriptions: Arc::clone(supervisor.subscriptions()),
            supervisor,
            interval: config.interval(),
            batch: config.bus_capacity.max(1),
            transcript_dir,
            transcripts: HashMap::new(),
        }
    }

    /// Ticks until `stop` is raised, then drains once more.
    pub async fn run(mut self, stop: StopSignal) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            select! {
                _ = stop.raised() => break,
                _ = ticker.tick() => {}
            }
            self.dispatch_pending();
        }
        self.dispatch_pending();
        debug!("dispatch loop stopped");
    }

    /// Handles what is queued right now without waiting for producers.
    pub fn dispatch_pending(&mut self) -> usize {
        let events = self.rx.drain(self.batch);
        let count = events.len();
        for event in events {
            self.handle(event);
        }
        if count > 0 {
            for transcript in self.transcripts.values_mut() {
                let _ = transcript.flush();
            }
        }
        count
    }

    fn handle(&mut self, event: LogEvent) {
        if let Some(id) = event.instance {
            let instance = self.supervisor.instance_by_id(id);
            if let (EventKind::Spawned { .. }, Some(instance)) = (&event.kind, &instance) {
                self.open_transcript(instance);
            }
            self.record(id, &event.text);

            if let Some(instance) = &instance {
                match &event.kind {
                    EventKind::Line if event.origin == LogOrigin::Console => {
                        self.on_console_line(instance, &event.text)
                    }
                    EventKind::Exited { code } => self.on_exit(instance, *code),
                    _ => {}
                }
            }
            if let EventKind::Exited { .. } = event.kind {
                self.transcripts.remove(&id);
            }
        }
        self.subscriptions.on_event.invoke(event);
    }

    fn on_console_line(&self, instance: &ServerInstance, line: &str) {
        match classify(line) {
            Some(LineMatch::Ready) => {
                if instance.mark_ready() {
                    self.reset_roster(instance);
                }
            }
            Some(found) => {
                if instance.with_roster(|roster| roster.apply(&found)) {
                    self.roster_changed(instance);
                }
            }
            None => {}
        }
    }

    fn on_exit(&self, instance: &ServerInstance, code: Option<i32>) {
        if instance.status().is_live() {
            let _ = instance.transition(LifecycleState::Stopped(code));
        }
        self.reset_roster(instance);
        self.supervisor.release(instance);
    }

    fn reset_roster(&self, instance: &ServerInstance) {
        if instance.with_roster(|roster| roster.reset()) {
            self.roster_changed(instance);
        }
    }

    fn roster_changed(&self, instance: &ServerInstance) {
        self.subscriptions.on_roster_change.invoke(RosterChange {
            instance: instance.id(),
            players: instance.players(),
        });
    }

    fn open_transcript(&mut self, instance: &ServerInstance) {
        let Some(dir) = &self.transcript_dir else {
            return;
        };
        match ConsoleTranscript::open(dir, instance.started_at()) {
            Ok(transcript) => {
                debug!("console transcript of {} at {:?}", instance.name(), transcript.path());
                self.transcripts.insert(instance.id(), transcript);
            }
            Err(err) => self.transcript_failed(instance.id(), err),
        }
    }

    fn record(&mut self, id: Uuid, text: &str) {
        let Some(transcript) = self.transcripts.get_mut(&id) else {
            return;
        };
        if let Err(err) = transcript.write_line(text) {
            self.transcripts.remove(&id);
            self.transcript_failed(id, err);
        }
    }

    fn transcript_failed(&self, id: Uuid, err: std::io::Error) {
        self.bus.try_publish(
            Some(id),
            LogOrigin::Daemon,
            Severity::Warn,
            EventKind::Line,
            format!("console transcript disabled: {}", err),
        );
    }
}
