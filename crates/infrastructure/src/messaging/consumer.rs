//! Idempotent consumer wrapper.
//!
//! Wraps a message handler with the idempotency guard: check, handle,
//! mark. The pipeline delivers at-least-once; this wrapper keeps a
//! redelivered message from re-running the handler, but a crash between
//! "handle" and "mark" will re-apply, so handlers must be idempotent at
//! the business layer. Consumers must also tolerate reordering across
//! aggregates; only per-aggregate claim order is preserved upstream.

use async_trait::async_trait;
use ripple_domain::events::EventEnvelope;
use ripple_domain::idempotency::{IdempotencyError, IdempotencyGuard};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConsumeError {
    #[error("Idempotency error: {0}")]
    Idempotency(#[from] IdempotencyError),

    #[error("Handler error: {0}")]
    Handler(String),
}

/// What a consumer did with a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The handler ran and the fingerprint was recorded.
    Applied,
    /// The fingerprint was already recorded; the handler was skipped,
    /// or ran but lost the mark race to a concurrent consumer.
    Duplicate,
}

/// Handler invoked for each non-duplicate message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, envelope: &EventEnvelope) -> anyhow::Result<()>;
}

/// Derives the idempotency fingerprint for an envelope: the event id
/// when the producer carried one, otherwise a content hash.
pub fn fingerprint(envelope: &EventEnvelope) -> String {
    match envelope.event_id {
        Some(id) => id.to_string(),
        None => {
            let mut hasher = Sha256::new();
            hasher.update(envelope.event_type.as_bytes());
            if let Ok(bytes) = serde_json::to_vec(&envelope.data) {
                hasher.update(&bytes);
            }
            hex::encode(hasher.finalize())
        }
    }
}

/// Check-handle-mark wrapper around a [`MessageHandler`].
pub struct IdempotentConsumer {
    guard: Arc<dyn IdempotencyGuard>,
    handler: Arc<dyn MessageHandler>,
}

impl IdempotentConsumer {
    pub fn new(guard: Arc<dyn IdempotencyGuard>, handler: Arc<dyn MessageHandler>) -> Self {
        Self { guard, handler }
    }

    pub async fn process(&self, envelope: &EventEnvelope) -> Result<ProcessOutcome, ConsumeError> {
        let fingerprint = fingerprint(envelope);

        if self.guard.already_processed(&fingerprint).await? {
            debug!(fingerprint = %fingerprint, event_type = %envelope.event_type, "Skipping duplicate message");
            return Ok(ProcessOutcome::Duplicate);
        }

        self.handler
            .handle(envelope)
            .await
            .map_err(|e| ConsumeError::Handler(e.to_string()))?;

        if !self.guard.mark_processed(&fingerprint).await? {
            // A concurrent consumer applied the same message first; the
            // effect ran twice, which the business layer must tolerate.
            debug!(fingerprint = %fingerprint, "Lost the mark race after applying");
            return Ok(ProcessOutcome::Duplicate);
        }

        Ok(ProcessOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_domain::testing::InMemoryIdempotencyGuard;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use uuid::Uuid;

    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(&self, _envelope: &EventEnvelope) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("simulated handler failure");
            }
            Ok(())
        }
    }

    fn envelope_with_id() -> EventEnvelope {
        EventEnvelope::new("contact.created", serde_json::json!({"n": 1}))
            .with_event_id(Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_first_delivery_applies_second_skips() {
        let guard = Arc::new(InMemoryIdempotencyGuard::new());
        let handler = Arc::new(CountingHandler::default());
        let consumer = IdempotentConsumer::new(guard, handler.clone());

        let envelope = envelope_with_id();
        assert_eq!(
            consumer.process(&envelope).await.unwrap(),
            ProcessOutcome::Applied
        );
        assert_eq!(
            consumer.process(&envelope).await.unwrap(),
            ProcessOutcome::Duplicate
        );
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_handler_leaves_message_unmarked() {
        let guard = Arc::new(InMemoryIdempotencyGuard::new());
        let handler = Arc::new(CountingHandler::default());
        handler.fail.store(true, Ordering::SeqCst);
        let consumer = IdempotentConsumer::new(guard, handler.clone());

        let envelope = envelope_with_id();
        assert!(consumer.process(&envelope).await.is_err());

        // Redelivery after the failure runs the handler again.
        handler.fail.store(false, Ordering::SeqCst);
        assert_eq!(
            consumer.process(&envelope).await.unwrap(),
            ProcessOutcome::Applied
        );
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fingerprint_prefers_event_id() {
        let id = Uuid::new_v4();
        let envelope =
            EventEnvelope::new("contact.created", serde_json::json!({"n": 1})).with_event_id(id);
        assert_eq!(fingerprint(&envelope), id.to_string());
    }

    #[test]
    fn test_fingerprint_content_hash_is_stable() {
        let a = EventEnvelope::new("contact.created", serde_json::json!({"n": 1}));
        let b = EventEnvelope::new("contact.created", serde_json::json!({"n": 1}));
        let c = EventEnvelope::new("contact.created", serde_json::json!({"n": 2}));

        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }
}
