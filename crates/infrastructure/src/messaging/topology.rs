//! JetStream topology and subject routing.
//!
//! One work-queue stream per event category, an audit stream for
//! outgoing confirmations, a catch-all for unknown event types, an
//! ingress stream for raw third-party payloads, and a dead-letter
//! stream with per-category subjects. Routing is direction-aware: the
//! same event type lands on the processing stream when it came from the
//! monitored party and on the audit stream when the system originated
//! it.

use anyhow::{Context, Result};
use async_nats::jetstream::stream::{
    Config as StreamConfig, DiscardPolicy, RetentionPolicy, StorageType,
};
use async_nats::jetstream::Context as JetStreamContext;
use ripple_domain::events::EventDirection;
use std::time::Duration;
use tracing::{info, warn};

/// Subject prefix for all pipeline traffic.
pub const SUBJECT_PREFIX: &str = "ripple";

/// Event category, derived from the leading segment of a dotted event
/// type (`contact.created` -> `Contacts`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Contacts,
    Conversations,
    Messages,
}

impl EventCategory {
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type.split('.').next() {
            Some("contact") => Some(EventCategory::Contacts),
            Some("conversation") => Some(EventCategory::Conversations),
            Some("message") => Some(EventCategory::Messages),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Contacts => "contacts",
            EventCategory::Conversations => "conversations",
            EventCategory::Messages => "messages",
        }
    }
}

/// Maps an event type and direction to its publish subject.
///
/// `contact.created` (inbound) -> `ripple.contacts.created`
/// `message.sent` (outbound)   -> `ripple.audit.message.sent`
/// `invoice.paid` (unknown)    -> `ripple.unrouted.invoice.paid`
pub fn subject_for(event_type: &str, direction: EventDirection) -> String {
    if direction == EventDirection::Outbound {
        return format!("{}.audit.{}", SUBJECT_PREFIX, event_type);
    }

    match EventCategory::from_event_type(event_type) {
        Some(category) => {
            let action = event_type.split_once('.').map(|(_, a)| a).unwrap_or("event");
            format!("{}.{}.{}", SUBJECT_PREFIX, category.as_str(), action)
        }
        None => format!("{}.unrouted.{}", SUBJECT_PREFIX, event_type),
    }
}

/// Subject for raw inbound third-party payloads.
pub fn ingress_subject(source_id: &str) -> String {
    format!("{}.ingress.{}", SUBJECT_PREFIX, sanitize_token(source_id))
}

/// Subject for dead-lettered messages of a category.
pub fn dlq_subject(category: &str) -> String {
    format!("{}.dlq.{}", SUBJECT_PREFIX, sanitize_token(category))
}

// NATS subject tokens must not contain '.', wildcards or whitespace.
fn sanitize_token(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn stream_configs() -> Vec<StreamConfig> {
    let work_queue = |name: &str, subjects: Vec<String>| StreamConfig {
        name: name.to_string(),
        subjects,
        retention: RetentionPolicy::WorkQueue,
        max_messages: 1_000_000,
        max_bytes: 1024 * 1024 * 1024, // 1GB
        max_age: Duration::from_secs(7 * 24 * 60 * 60),
        storage: StorageType::File,
        discard: DiscardPolicy::Old,
        num_replicas: 1,
        ..Default::default()
    };

    let limits = |name: &str, subjects: Vec<String>, max_age: Duration| StreamConfig {
        name: name.to_string(),
        subjects,
        retention: RetentionPolicy::Limits,
        max_messages: 500_000,
        max_bytes: 512 * 1024 * 1024,
        max_age,
        storage: StorageType::File,
        discard: DiscardPolicy::Old,
        num_replicas: 1,
        ..Default::default()
    };

    vec![
        // Processing streams, one per event category
        work_queue("RIPPLE_contacts", vec!["ripple.contacts.*".into()]),
        work_queue("RIPPLE_conversations", vec!["ripple.conversations.*".into()]),
        work_queue("RIPPLE_messages", vec!["ripple.messages.*".into()]),
        // Raw inbound third-party payloads
        work_queue("RIPPLE_ingress", vec!["ripple.ingress.*".into()]),
        // Outgoing confirmations, kept for audit
        limits(
            "RIPPLE_audit",
            vec!["ripple.audit.>".into()],
            Duration::from_secs(30 * 24 * 60 * 60),
        ),
        // Catch-all for unknown event types; never dropped silently
        limits(
            "RIPPLE_unrouted",
            vec!["ripple.unrouted.>".into()],
            Duration::from_secs(30 * 24 * 60 * 60),
        ),
        // Dead letters, per-category subjects, consumed by tooling
        limits(
            "RIPPLE_dlq",
            vec!["ripple.dlq.*".into()],
            Duration::from_secs(30 * 24 * 60 * 60),
        ),
    ]
}

/// Declares all pipeline streams. Idempotent; safe on every startup and
/// after every reconnect.
pub async fn ensure_topology(jetstream: &JetStreamContext) -> Result<()> {
    for stream_config in stream_configs() {
        let name = stream_config.name.clone();
        info!(stream = %name, "Ensuring JetStream stream");
        match jetstream.create_stream(stream_config).await {
            Ok(_) => {}
            Err(e) => {
                // Creation fails when the stream already exists with a
                // different revision; verify it is reachable either way.
                warn!(stream = %name, error = %e, "Stream creation issue (may already exist)");
                jetstream
                    .get_stream(&name)
                    .await
                    .with_context(|| format!("stream {} unavailable", name))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_event_type() {
        assert_eq!(
            EventCategory::from_event_type("contact.created"),
            Some(EventCategory::Contacts)
        );
        assert_eq!(
            EventCategory::from_event_type("message.sent"),
            Some(EventCategory::Messages)
        );
        assert_eq!(EventCategory::from_event_type("invoice.paid"), None);
    }

    #[test]
    fn test_inbound_routes_to_processing() {
        assert_eq!(
            subject_for("contact.created", EventDirection::Inbound),
            "ripple.contacts.created"
        );
        assert_eq!(
            subject_for("message.received", EventDirection::Inbound),
            "ripple.messages.received"
        );
    }

    #[test]
    fn test_outbound_routes_to_audit() {
        // Same event type, different direction, different stream.
        assert_eq!(
            subject_for("message.delivery_confirmed", EventDirection::Outbound),
            "ripple.audit.message.delivery_confirmed"
        );
        assert_eq!(
            subject_for("message.delivery_confirmed", EventDirection::Inbound),
            "ripple.messages.delivery_confirmed"
        );
    }

    #[test]
    fn test_unknown_type_routes_to_catch_all() {
        assert_eq!(
            subject_for("invoice.paid", EventDirection::Inbound),
            "ripple.unrouted.invoice.paid"
        );
    }

    #[test]
    fn test_ingress_subject_is_sanitized() {
        assert_eq!(ingress_subject("wa-main"), "ripple.ingress.wa-main");
        assert_eq!(ingress_subject("shop.example"), "ripple.ingress.shop_example");
        assert_eq!(ingress_subject("bad id*"), "ripple.ingress.bad_id_");
    }

    #[test]
    fn test_dlq_subject() {
        assert_eq!(dlq_subject("contacts"), "ripple.dlq.contacts");
    }
}
