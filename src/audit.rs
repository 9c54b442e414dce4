//! Audit Sink
//!
//! Write-only contract for the external audit log. The core never waits on
//! the sink: `record` is synchronous and must not block, and events reach
//! it only after the owning unit of work committed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core_types::ActorId;

/// One audit record
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub entity: &'static str,
    pub entity_id: String,
    pub action: &'static str,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    pub actor_id: ActorId,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        entity: &'static str,
        entity_id: impl ToString,
        action: &'static str,
        actor_id: ActorId,
    ) -> Self {
        Self {
            entity,
            entity_id: entity_id.to_string(),
            action,
            before_state: None,
            after_state: None,
            actor_id,
            at: Utc::now(),
        }
    }

    pub fn before<T: Serialize>(mut self, state: &T) -> Self {
        self.before_state = serde_json::to_value(state).ok();
        self
    }

    pub fn after<T: Serialize>(mut self, state: &T) -> Self {
        self.after_state = serde_json::to_value(state).ok();
        self
    }
}

/// Audit sink trait
///
/// Implementations must return promptly; fire-and-forget is acceptable.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Discards every event
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: AuditEvent) {}
}

/// Keeps events in memory; used by tests and embedded callers
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Bounded channel in front of the audit log.
///
/// A full channel drops the event with a warning instead of applying
/// back-pressure to committed business operations.
pub struct ChannelAuditSink {
    tx: mpsc::Sender<AuditEvent>,
}

/// Create a connected sink/worker pair
pub fn channel(capacity: usize) -> (ChannelAuditSink, AuditWorker) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelAuditSink { tx }, AuditWorker { rx })
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, event: AuditEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    entity = event.entity,
                    entity_id = %event.entity_id,
                    action = event.action,
                    "Audit channel full - event dropped"
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(
                    entity = event.entity,
                    entity_id = %event.entity_id,
                    action = event.action,
                    "Audit worker stopped - event dropped"
                );
            }
        }
    }
}

/// Drains the audit channel into the `audit` tracing target
pub struct AuditWorker {
    rx: mpsc::Receiver<AuditEvent>,
}

impl AuditWorker {
    /// Runs until every sender is dropped
    pub async fn run(mut self) {
        info!("Starting audit worker");
        while let Some(event) = self.rx.recv().await {
            emit(&event);
        }
        info!("Audit worker stopped");
    }
}

fn emit(event: &AuditEvent) {
    let before = event
        .before_state
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default();
    let after = event
        .after_state
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default();

    info!(
        target: "audit",
        entity = event.entity,
        entity_id = %event.entity_id,
        action = event.action,
        actor_id = event.actor_id,
        at = %event.at.to_rfc3339(),
        before = %before,
        after = %after,
        "audit"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Snapshot {
        status: &'static str,
    }

    #[test]
    fn test_event_builder_captures_states() {
        let event = AuditEvent::new("gauge", 7, "checkout", 99)
            .before(&Snapshot { status: "available" })
            .after(&Snapshot {
                status: "checked_out",
            });

        assert_eq!(event.entity_id, "7");
        assert_eq!(event.actor_id, 99);
        assert_eq!(
            event.before_state.unwrap()["status"],
            serde_json::json!("available")
        );
        assert_eq!(
            event.after_state.unwrap()["status"],
            serde_json::json!("checked_out")
        );
    }

    #[test]
    fn test_memory_sink_records() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());
        sink.record(AuditEvent::new("batch", 1, "send", 5));
        sink.record(AuditEvent::new("batch", 1, "close", 5));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events()[1].action, "close");
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_to_worker() {
        let (sink, mut worker) = channel(4);
        sink.record(AuditEvent::new("gauge", 1, "pair", 3));

        let received = worker.rx.recv().await.unwrap();
        assert_eq!(received.action, "pair");
    }

    #[tokio::test]
    async fn test_channel_sink_drops_when_full() {
        let (sink, mut worker) = channel(1);
        sink.record(AuditEvent::new("gauge", 1, "first", 3));
        sink.record(AuditEvent::new("gauge", 1, "second", 3)); // dropped, must not block

        assert_eq!(worker.rx.recv().await.unwrap().action, "first");
        assert!(worker.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_worker_exits_when_senders_dropped() {
        let (sink, worker) = channel(2);
        sink.record(AuditEvent::new("gauge", 1, "retire", 3));
        drop(sink);
        // Returns once the queued event is drained and the channel closes
        worker.run().await;
    }
}
