//! Inbound third-party payload envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimal metadata wrapper around a raw inbound webhook body.
///
/// The ingress path accepts anything; payloads that are not valid JSON
/// are carried as a string so nothing is rejected synchronously.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub event_id: Uuid,
    pub source_id: String,
    pub received_at: DateTime<Utc>,
    pub content_type: String,
    pub payload: serde_json::Value,
}

impl InboundEnvelope {
    pub fn new(source_id: impl Into<String>, content_type: impl Into<String>, body: &[u8]) -> Self {
        let payload = serde_json::from_slice(body)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(body).into_owned()));

        Self {
            event_id: Uuid::new_v4(),
            source_id: source_id.into(),
            received_at: Utc::now(),
            content_type: content_type.into(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_body_is_parsed() {
        let envelope = InboundEnvelope::new("wa-main", "application/json", br#"{"k": 1}"#);
        assert_eq!(envelope.source_id, "wa-main");
        assert_eq!(envelope.payload, serde_json::json!({"k": 1}));
    }

    #[test]
    fn test_non_json_body_is_kept_verbatim() {
        let envelope = InboundEnvelope::new("wa-main", "text/plain", b"hello there");
        assert_eq!(
            envelope.payload,
            serde_json::Value::String("hello there".to_string())
        );
    }
}
