//! Broker gateway port.
//!
//! The single owned connection to the message broker lives behind this
//! trait; reconnect and topology logic is entirely the implementor's
//! concern and is never duplicated at call sites.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish to {subject}: {cause}")]
    PublishError { subject: String, cause: String },
    #[error("Publish to {subject} timed out after {timeout_ms}ms")]
    PublishTimeout { subject: String, timeout_ms: u64 },
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("Topology error: {0}")]
    TopologyError(String),
}

/// Port for publishing messages to the broker.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a payload to a subject/queue. The call must be bounded
    /// by a timeout so a slow broker cannot stall a dispatcher.
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), EventBusError>;

    /// Declares streams, queues and dead-letter topology. Idempotent;
    /// safe to call on every startup and after every reconnect.
    async fn setup_topology(&self) -> Result<(), EventBusError>;
}
