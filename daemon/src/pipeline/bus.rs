use chrono::Utc;
use log::{debug, error, info, warn};
use mcsm_protocol::event::{EventKind, LogEvent, LogOrigin, Severity};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Producer side of the event bus. Cheap to clone; every reader, monitor and
/// backup job holds its own copy.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<LogEvent>,
    seq: Arc<AtomicU64>,
}

/// Single consumer side, owned by the dispatch loop.
pub struct EventReceiver {
    rx: mpsc::Receiver<LogEvent>,
}

pub fn channel(capacity: usize) -> (EventBus, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EventBus {
            tx,
            seq: Arc::new(AtomicU64::new(1)),
        },
        EventReceiver { rx },
    )
}

impl EventBus {
    fn build(
        &self,
        instance: Option<Uuid>,
        origin: LogOrigin,
        severity: Severity,
        kind: EventKind,
        text: String,
    ) -> LogEvent {
        if origin == LogOrigin::Daemon {
            mirror(instance, severity, &text);
        }
        LogEvent {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            time: Utc::now(),
            instance,
            origin,
            severity,
            kind,
            text,
        }
    }

    /// Waits for queue space. Only fails silently once the consumer is gone.
    pub async fn publish(
        &self,
        instance: Option<Uuid>,
        origin: LogOrigin,
        severity: Severity,
        kind: EventKind,
        text: impl Into<String>,
    ) {
        let event = self.build(instance, origin, severity, kind, text.into());
        if self.tx.send(event).await.is_err() {
            debug!("event bus closed, event dropped");
        }
    }

    /// Non-blocking variant for callers that must not wait on the consumer.
    pub fn try_publish(
        &self,
        instance: Option<Uuid>,
        origin: LogOrigin,
        severity: Severity,
        kind: EventKind,
        text: impl Into<String>,
    ) -> bool {
        let event = self.build(instance, origin, severity, kind, text.into());
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("event bus full, dropped: {}", event.text);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub async fn console_line(&self, instance: Uuid, severity: Severity, text: String) {
        self.publish(
            Some(instance),
            LogOrigin::Console,
            severity,
            EventKind::Line,
            text,
        )
        .await
    }

    pub async fn daemon(&self, instance: Option<Uuid>, severity: Severity, text: impl Into<String>) {
        self.publish(instance, LogOrigin::Daemon, severity, EventKind::Line, text)
            .await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn mirror(instance: Option<Uuid>, severity: Severity, text: &str) {
    let scope = instance
        .map(|id| id.to_string())
        .unwrap_or_else(|| "daemon".to_owned());
    match severity {
        Severity::Info => info!("[{}] {}", scope, text),
        Severity::Warn => warn!("[{}] {}", scope, text),
        Severity::Error => error!("[{}] {}", scope, text),
    }
}

impl EventReceiver {
    pub fn try_recv(&mut self) -> Option<LogEvent> {
        self.rx.try_recv().ok()
    }

    pub async fn recv(&mut self) -> Option<LogEvent> {
        self.rx.recv().await
    }

    /// Takes whatever is queued right now, at most `max` events.
    pub fn drain(&mut self, max: usize) -> Vec<LogEvent> {
        let mut events = Vec::new();
        while events.len() < max {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        events
    }
}
