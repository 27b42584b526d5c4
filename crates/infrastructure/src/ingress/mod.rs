//! Raw ingress buffer.
//!
//! Accepts inbound third-party webhook bodies unconditionally and hands
//! them to the broker for asynchronous processing. Enqueue failure is
//! logged and the payload is accepted-but-dropped; the external caller
//! always sees success. This trades a logged, alertable possibility of
//! loss for ingress availability, unlike the outbox path's stronger
//! guarantee.

use ripple_domain::event_bus::EventBus;
use ripple_domain::ingress::InboundEnvelope;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::messaging::topology;

pub struct RawIngressBuffer {
    bus: Arc<dyn EventBus>,
}

impl RawIngressBuffer {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    /// Accepts a raw inbound payload. Never fails.
    pub async fn accept(&self, source_id: &str, content_type: &str, body: &[u8]) -> Uuid {
        let envelope = InboundEnvelope::new(source_id, content_type, body);
        let event_id = envelope.event_id;
        let subject = topology::ingress_subject(source_id);

        let bytes = match serde_json::to_vec(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(
                    event_id = %event_id,
                    source_id = %source_id,
                    error = %e,
                    "Inbound payload accepted but dropped: envelope serialization failed"
                );
                return event_id;
            }
        };

        match self.bus.publish(&subject, &bytes).await {
            Ok(()) => {
                debug!(event_id = %event_id, subject = %subject, "Inbound payload enqueued");
            }
            Err(e) => {
                error!(
                    event_id = %event_id,
                    source_id = %source_id,
                    subject = %subject,
                    error = %e,
                    "Inbound payload accepted but dropped: enqueue failed"
                );
            }
        }

        event_id
    }
}
