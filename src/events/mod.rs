//! Outbound domain events.
//!
//! Services publish only after the owning transaction has committed (or, for
//! `CapacityExceeded`, rolled back). A failing sink is logged and otherwise
//! ignored: notification trouble never undoes or fails an operation.

pub mod mail;

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{info, warn};

use academy_models::DomainEvent;

pub use mail::MailEventSink;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Publishes each event in order, logging failures instead of returning them.
pub async fn publish_all(sink: &dyn EventSink, events: &[DomainEvent]) {
    for event in events {
        if let Err(e) = sink.publish(event).await {
            warn!(event = event.name(), error = %e, "failed to publish domain event");
        }
    }
}

/// Writes every event as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(event)?;
        info!(event = event.name(), %payload, "domain event");
        Ok(())
    }
}

/// Keeps published events in memory for assertions.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<DomainEvent>>,
    failing: bool,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records each event and then reports a delivery failure.
    pub fn failing() -> Self {
        Self {
            events: Mutex::default(),
            failing: true,
        }
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        if self.failing {
            anyhow::bail!("recording sink configured to fail");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use academy_models::{BatchId, StudentId};

    #[tokio::test]
    async fn test_publish_all_keeps_going_after_failure() {
        let sink = RecordingEventSink::failing();
        let events = vec![
            DomainEvent::EnrollmentSucceeded {
                student_id: StudentId::new(),
                batch_id: BatchId::new(),
            },
            DomainEvent::PaymentRejected {
                payment_id: academy_models::PaymentId::new(),
                reason: "slip unreadable".into(),
            },
        ];

        publish_all(&sink, &events).await;
        assert_eq!(sink.events(), events);
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_events() {
        let event = DomainEvent::CapacityExceeded {
            batch_id: BatchId::new(),
            current_count: 4,
            max_capacity: 4,
        };
        assert!(TracingEventSink.publish(&event).await.is_ok());
    }
}
