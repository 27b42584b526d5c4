//! Outbox entry publisher.
//!
//! The single claim-to-broker step shared by both dispatch strategies:
//! resolve the subject from event type and direction, wrap the stored
//! payload in the wire envelope, publish through the broker gateway.
//! An optional fan-out consumer is invoked after a successful publish;
//! its failures never affect the outbox transition.

use ripple_domain::event_bus::EventBus;
use ripple_domain::events::{DomainEvent, EventDirection, EventEnvelope};
use ripple_domain::outbox::{OutboxEntryView, OutboxError};
use std::sync::Arc;
use tracing::warn;

use crate::messaging::consumer::IdempotentConsumer;
use crate::messaging::topology;

pub struct EntryPublisher {
    bus: Arc<dyn EventBus>,
    fanout: Option<Arc<IdempotentConsumer>>,
}

impl EntryPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus, fanout: None }
    }

    /// Attaches a consumer run once per successfully published entry,
    /// deduplicated by the entry id so a re-swept row does not trigger
    /// downstream side effects twice.
    pub fn with_fanout(mut self, fanout: Arc<IdempotentConsumer>) -> Self {
        self.fanout = Some(fanout);
        self
    }

    /// Direction flag carried in the payload, defaulting to inbound.
    fn direction_of(entry: &OutboxEntryView) -> EventDirection {
        if let Ok(event) = serde_json::from_value::<DomainEvent>(entry.payload.clone()) {
            return event.direction();
        }
        match entry
            .metadata
            .as_ref()
            .and_then(|m| m.get("direction"))
            .and_then(|d| d.as_str())
        {
            Some("outbound") => EventDirection::Outbound,
            _ => EventDirection::Inbound,
        }
    }

    pub fn envelope_for(entry: &OutboxEntryView) -> EventEnvelope {
        EventEnvelope {
            event_type: entry.event_type.clone(),
            timestamp: entry.created_at,
            data: entry.payload.clone(),
            event_id: Some(entry.id),
            direction: Some(Self::direction_of(entry)),
        }
    }

    pub async fn publish(&self, entry: &OutboxEntryView) -> Result<(), OutboxError> {
        let direction = Self::direction_of(entry);
        let subject = topology::subject_for(&entry.event_type, direction);
        let envelope = Self::envelope_for(entry);
        let bytes = envelope.to_json_bytes()?;

        self.bus
            .publish(&subject, &bytes)
            .await
            .map_err(|e| OutboxError::Broker(e.to_string()))?;

        if let Some(fanout) = &self.fanout {
            // The entry is already durable on the broker; fan-out
            // failure is logged, not propagated.
            if let Err(e) = fanout.process(&envelope).await {
                warn!(event_id = %entry.id, error = %e, "Post-publish fan-out failed");
            }
        }

        Ok(())
    }

    /// Routes a corrupt or undeliverable entry to the dead-letter
    /// stream for operational tooling. Best effort; a DLQ publish
    /// failure is only logged.
    pub async fn dead_letter(&self, entry: &OutboxEntryView, reason: &str) {
        let category = topology::EventCategory::from_event_type(&entry.event_type)
            .map(|c| c.as_str())
            .unwrap_or("unrouted");
        let subject = topology::dlq_subject(category);

        let body = serde_json::json!({
            "event_id": entry.id,
            "event_type": entry.event_type,
            "error": reason,
            "payload": entry.payload,
        });
        let bytes = match serde_json::to_vec(&body) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(event_id = %entry.id, error = %e, "Dead-letter record serialization failed");
                return;
            }
        };

        if let Err(e) = self.bus.publish(&subject, &bytes).await {
            warn!(event_id = %entry.id, subject = %subject, error = %e, "Dead-letter publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use ripple_domain::outbox::{AggregateType, OutboxStatus};
    use ripple_domain::testing::{InMemoryIdempotencyGuard, RecordingEventBus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn entry(event_type: &str, payload: serde_json::Value) -> OutboxEntryView {
        OutboxEntryView {
            id: Uuid::new_v4(),
            aggregate_id: Uuid::new_v4(),
            aggregate_type: AggregateType::Message,
            event_type: event_type.to_string(),
            payload,
            metadata: None,
            idempotency_key: None,
            created_at: Utc::now(),
            dispatched_at: None,
            status: OutboxStatus::Pending,
            attempt_count: 0,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn test_publish_routes_by_payload_direction() {
        let bus = Arc::new(RecordingEventBus::new());
        let publisher = EntryPublisher::new(bus.clone());

        let sent = DomainEvent::MessageSent {
            message_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        };
        let outbound = entry("message.sent", serde_json::to_value(&sent).unwrap());
        publisher.publish(&outbound).await.unwrap();

        let received = DomainEvent::MessageReceived {
            message_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        };
        let inbound = entry("message.received", serde_json::to_value(&received).unwrap());
        publisher.publish(&inbound).await.unwrap();

        assert_eq!(
            bus.published_subjects(),
            vec![
                "ripple.audit.message.sent".to_string(),
                "ripple.messages.received".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_event_type_goes_to_catch_all() {
        let bus = Arc::new(RecordingEventBus::new());
        let publisher = EntryPublisher::new(bus.clone());

        publisher
            .publish(&entry("invoice.paid", serde_json::json!({"amount": 5})))
            .await
            .unwrap();

        assert_eq!(
            bus.published_subjects(),
            vec!["ripple.unrouted.invoice.paid".to_string()]
        );
    }

    #[tokio::test]
    async fn test_envelope_carries_entry_id_for_fingerprinting() {
        let e = entry("contact.created", serde_json::json!({"n": 1}));
        let envelope = EntryPublisher::envelope_for(&e);
        assert_eq!(envelope.event_id, Some(e.id));
        assert_eq!(envelope.event_type, "contact.created");
    }

    struct CountingHandler(AtomicUsize);

    #[async_trait]
    impl crate::messaging::consumer::MessageHandler for CountingHandler {
        async fn handle(&self, _envelope: &EventEnvelope) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fanout_runs_once_per_entry() {
        let bus = Arc::new(RecordingEventBus::new());
        let handler = Arc::new(CountingHandler(AtomicUsize::new(0)));
        let fanout = Arc::new(IdempotentConsumer::new(
            Arc::new(InMemoryIdempotencyGuard::new()),
            handler.clone(),
        ));
        let publisher = EntryPublisher::new(bus).with_fanout(fanout);

        let e = entry("contact.created", serde_json::json!({"n": 1}));
        publisher.publish(&e).await.unwrap();
        // A republished row (fallback sweep after a lost mark) must not
        // fan out again.
        publisher.publish(&e).await.unwrap();

        assert_eq!(handler.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dead_letter_targets_category_dlq_subject() {
        let bus = Arc::new(RecordingEventBus::new());
        let publisher = EntryPublisher::new(bus.clone());

        let e = entry("contact.created", serde_json::json!({"broken": true}));
        publisher.dead_letter(&e, "attempts exhausted").await;

        let published = bus.published();
        assert_eq!(published[0].0, "ripple.dlq.contacts");

        let record: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(record["event_type"], "contact.created");
        assert_eq!(record["error"], "attempts exhausted");
        assert_eq!(record["event_id"], serde_json::json!(e.id));
    }

    #[tokio::test]
    async fn test_broker_failure_surfaces_as_outbox_error() {
        let bus = Arc::new(RecordingEventBus::new());
        bus.set_failing(true);
        let publisher = EntryPublisher::new(bus);

        let result = publisher
            .publish(&entry("contact.created", serde_json::json!({})))
            .await;
        assert!(matches!(result, Err(OutboxError::Broker(_))));
    }
}
