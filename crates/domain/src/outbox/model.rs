//! Outbox entry model.
//!
//! An outbox entry is one committed domain event awaiting propagation.
//! Entries are created in the same transaction as the aggregate write
//! they describe and are never mutated except for status and attempt
//! transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::DomainEvent;

/// Status of an outbox entry.
///
/// Progression is monotonic: `Pending -> Dispatched` (terminal) or
/// `Pending -> Failed` once attempts are exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    /// Created but not yet published to the broker
    Pending,
    /// Successfully published (terminal)
    Dispatched,
    /// Attempts exhausted; requires operator intervention
    Failed,
}

/// Error types for outbox operations.
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Duplicate idempotency key: {0}")]
    DuplicateIdempotencyKey(String),

    #[error("Entry not found: {0}")]
    NotFound(Uuid),

    #[error("Max attempts exceeded for entry {0}")]
    MaxAttemptsExceeded(Uuid),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Infrastructure error: {message}")]
    Infrastructure { message: String },
}

/// Type of aggregate an outbox entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateType {
    Contact,
    Conversation,
    Message,
}

impl std::fmt::Display for AggregateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateType::Contact => write!(f, "CONTACT"),
            AggregateType::Conversation => write!(f, "CONVERSATION"),
            AggregateType::Message => write!(f, "MESSAGE"),
        }
    }
}

/// An outbox entry ready to be inserted.
#[derive(Debug, Clone)]
pub struct OutboxEntryInsert {
    pub aggregate_id: Uuid,
    pub aggregate_type: AggregateType,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
}

impl OutboxEntryInsert {
    pub fn new(
        aggregate_id: Uuid,
        aggregate_type: AggregateType,
        event_type: String,
        payload: serde_json::Value,
        metadata: Option<serde_json::Value>,
        idempotency_key: Option<String>,
    ) -> Self {
        Self {
            aggregate_id,
            aggregate_type,
            event_type,
            payload,
            metadata,
            idempotency_key,
        }
    }

    /// Builds an entry from a domain event, serializing it as the payload.
    pub fn from_domain_event(
        event: &DomainEvent,
        aggregate_type: AggregateType,
        idempotency_key: Option<String>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            event.aggregate_id(),
            aggregate_type,
            event.event_type().to_string(),
            serde_json::to_value(event)?,
            None,
            idempotency_key,
        ))
    }

    pub fn for_contact(
        contact_id: Uuid,
        event_type: String,
        payload: serde_json::Value,
        idempotency_key: Option<String>,
    ) -> Self {
        Self::new(
            contact_id,
            AggregateType::Contact,
            event_type,
            payload,
            None,
            idempotency_key,
        )
    }

    pub fn for_message(
        message_id: Uuid,
        event_type: String,
        payload: serde_json::Value,
        idempotency_key: Option<String>,
    ) -> Self {
        Self::new(
            message_id,
            AggregateType::Message,
            event_type,
            payload,
            None,
            idempotency_key,
        )
    }
}

/// A view of an outbox entry as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntryView {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: AggregateType,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub status: OutboxStatus,
    pub attempt_count: i32,
    pub last_error: Option<String>,
}

impl OutboxEntryView {
    pub fn is_pending(&self) -> bool {
        matches!(self.status, OutboxStatus::Pending)
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self.status, OutboxStatus::Dispatched)
    }

    /// Whether the entry is terminally failed given a retry budget.
    pub fn has_failed(&self, max_attempts: i32) -> bool {
        matches!(self.status, OutboxStatus::Failed) && self.attempt_count >= max_attempts
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_type_display() {
        assert_eq!(AggregateType::Contact.to_string(), "CONTACT");
        assert_eq!(AggregateType::Conversation.to_string(), "CONVERSATION");
        assert_eq!(AggregateType::Message.to_string(), "MESSAGE");
    }

    #[test]
    fn test_entry_insert_from_domain_event() {
        let event = DomainEvent::ContactCreated {
            contact_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        };
        let entry =
            OutboxEntryInsert::from_domain_event(&event, AggregateType::Contact, None).unwrap();

        assert_eq!(entry.aggregate_id, event.aggregate_id());
        assert_eq!(entry.event_type, "contact.created");
        assert!(entry.idempotency_key.is_none());
    }

    #[test]
    fn test_entry_view_status_checks() {
        let entry = OutboxEntryView {
            id: Uuid::new_v4(),
            aggregate_id: Uuid::new_v4(),
            aggregate_type: AggregateType::Message,
            event_type: "message.received".to_string(),
            payload: serde_json::json!({"test": "data"}),
            metadata: None,
            idempotency_key: None,
            created_at: Utc::now(),
            dispatched_at: None,
            status: OutboxStatus::Pending,
            attempt_count: 0,
            last_error: None,
        };

        assert!(entry.is_pending());
        assert!(!entry.is_dispatched());
        assert!(!entry.has_failed(5));
    }

    #[test]
    fn test_entry_view_failed_after_attempts() {
        let entry = OutboxEntryView {
            id: Uuid::new_v4(),
            aggregate_id: Uuid::new_v4(),
            aggregate_type: AggregateType::Contact,
            event_type: "contact.updated".to_string(),
            payload: serde_json::json!({}),
            metadata: None,
            idempotency_key: None,
            created_at: Utc::now(),
            dispatched_at: None,
            status: OutboxStatus::Failed,
            attempt_count: 5,
            last_error: Some("connection timeout".to_string()),
        };

        assert!(!entry.is_pending());
        assert!(entry.has_failed(5));
    }
}
