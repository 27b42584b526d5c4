//! Domain events transported by the delivery pipeline.
//!
//! Events are immutable facts. The pipeline does not interpret their
//! business meaning; it only needs the event type (for routing and
//! subscription matching), the aggregate identity (for per-aggregate
//! ordering) and the direction flag (for broker-side queue routing).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of an event relative to the monitored party.
///
/// Inbound events originate from the monitored party and are routed to
/// the processing queue; outbound events are confirmations the system
/// itself originated and go to the audit queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventDirection {
    Inbound,
    Outbound,
}

/// A domain event that has occurred in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum DomainEvent {
    #[serde(rename = "contact.created")]
    ContactCreated {
        contact_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename = "contact.updated")]
    ContactUpdated {
        contact_id: Uuid,
        changes: serde_json::Value,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename = "contact.deleted")]
    ContactDeleted {
        contact_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename = "conversation.opened")]
    ConversationOpened {
        conversation_id: Uuid,
        contact_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename = "conversation.closed")]
    ConversationClosed {
        conversation_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename = "message.received")]
    MessageReceived {
        message_id: Uuid,
        conversation_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename = "message.sent")]
    MessageSent {
        message_id: Uuid,
        conversation_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename = "message.delivery_confirmed")]
    MessageDeliveryConfirmed {
        message_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    /// Escape hatch for event types this crate does not model yet.
    #[serde(rename = "custom")]
    Custom {
        event_type: String,
        aggregate_id: Uuid,
        payload: serde_json::Value,
        direction: EventDirection,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Dotted event-type string used for routing and subscription matching.
    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::ContactCreated { .. } => "contact.created",
            DomainEvent::ContactUpdated { .. } => "contact.updated",
            DomainEvent::ContactDeleted { .. } => "contact.deleted",
            DomainEvent::ConversationOpened { .. } => "conversation.opened",
            DomainEvent::ConversationClosed { .. } => "conversation.closed",
            DomainEvent::MessageReceived { .. } => "message.received",
            DomainEvent::MessageSent { .. } => "message.sent",
            DomainEvent::MessageDeliveryConfirmed { .. } => "message.delivery_confirmed",
            DomainEvent::Custom { event_type, .. } => event_type,
        }
    }

    /// Identity of the aggregate the event belongs to.
    pub fn aggregate_id(&self) -> Uuid {
        match self {
            DomainEvent::ContactCreated { contact_id, .. }
            | DomainEvent::ContactUpdated { contact_id, .. }
            | DomainEvent::ContactDeleted { contact_id, .. } => *contact_id,
            DomainEvent::ConversationOpened {
                conversation_id, ..
            }
            | DomainEvent::ConversationClosed {
                conversation_id, ..
            } => *conversation_id,
            DomainEvent::MessageReceived { message_id, .. }
            | DomainEvent::MessageSent { message_id, .. }
            | DomainEvent::MessageDeliveryConfirmed { message_id, .. } => *message_id,
            DomainEvent::Custom { aggregate_id, .. } => *aggregate_id,
        }
    }

    /// Direction flag used by broker-side routing.
    pub fn direction(&self) -> EventDirection {
        match self {
            DomainEvent::MessageSent { .. } | DomainEvent::MessageDeliveryConfirmed { .. } => {
                EventDirection::Outbound
            }
            DomainEvent::Custom { direction, .. } => *direction,
            _ => EventDirection::Inbound,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::ContactCreated { occurred_at, .. }
            | DomainEvent::ContactUpdated { occurred_at, .. }
            | DomainEvent::ContactDeleted { occurred_at, .. }
            | DomainEvent::ConversationOpened { occurred_at, .. }
            | DomainEvent::ConversationClosed { occurred_at, .. }
            | DomainEvent::MessageReceived { occurred_at, .. }
            | DomainEvent::MessageSent { occurred_at, .. }
            | DomainEvent::MessageDeliveryConfirmed { occurred_at, .. }
            | DomainEvent::Custom { occurred_at, .. } => *occurred_at,
        }
    }
}

/// Wire envelope published to queues and POSTed to webhook subscribers.
///
/// The external contract is `{event_type, timestamp, data}`; `event_id`
/// and `direction` are carried when present so consumers can fingerprint
/// and brokers can route, and are omitted from the serialized form when
/// absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<EventDirection>,
}

impl EventEnvelope {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: Utc::now(),
            data,
            event_id: None,
            direction: None,
        }
    }

    /// Builds the envelope for a domain event.
    pub fn from_domain_event(event: &DomainEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            timestamp: event.occurred_at(),
            data: serde_json::to_value(event)?,
            event_id: None,
            direction: Some(event.direction()),
        })
    }

    pub fn with_event_id(mut self, id: Uuid) -> Self {
        self.event_id = Some(id);
        self
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_strings() {
        let event = DomainEvent::ContactCreated {
            contact_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        };
        assert_eq!(event.event_type(), "contact.created");

        let event = DomainEvent::MessageDeliveryConfirmed {
            message_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        };
        assert_eq!(event.event_type(), "message.delivery_confirmed");
    }

    #[test]
    fn test_direction_defaults() {
        let received = DomainEvent::MessageReceived {
            message_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        };
        assert_eq!(received.direction(), EventDirection::Inbound);

        let sent = DomainEvent::MessageSent {
            message_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        };
        assert_eq!(sent.direction(), EventDirection::Outbound);
    }

    #[test]
    fn test_envelope_roundtrip() {
        let event = DomainEvent::ContactCreated {
            contact_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        };
        let envelope = EventEnvelope::from_domain_event(&event).unwrap();
        assert_eq!(envelope.event_type, "contact.created");

        let decoded: DomainEvent = serde_json::from_value(envelope.data.clone()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_envelope_serialized_shape() {
        let envelope = EventEnvelope::new("contact.created", serde_json::json!({"id": 1}));
        let json = serde_json::to_value(&envelope).unwrap();
        let obj = json.as_object().unwrap();

        assert!(obj.contains_key("event_type"));
        assert!(obj.contains_key("timestamp"));
        assert!(obj.contains_key("data"));
        // Optional fields stay off the wire when unset
        assert!(!obj.contains_key("event_id"));
        assert!(!obj.contains_key("direction"));
    }
}
