//! NATS JetStream broker gateway.
//!
//! Owns the single connection to the broker, constructed once at
//! process start and injected everywhere as `Arc<dyn EventBus>`.
//! Reconnection is delegated to the client's connect options; topology
//! is re-declared through the idempotent `setup_topology`.

use async_nats::jetstream::Context as JetStreamContext;
use async_nats::ConnectOptions;
use async_trait::async_trait;
use ripple_domain::event_bus::{EventBus, EventBusError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::messaging::topology;

/// NATS connection configuration with production defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// NATS server URLs
    #[serde(default = "default_urls")]
    pub urls: Vec<String>,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connection_timeout_secs: u64,
    /// Request timeout in seconds (None = no timeout)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: Option<u64>,
    /// Max reconnection attempts (None = infinite)
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: Option<usize>,
    /// Upper bound on a single publish, ack included
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_ms: u64,
    /// Client connection name
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            urls: default_urls(),
            connection_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            max_reconnects: default_max_reconnects(),
            publish_timeout_ms: default_publish_timeout(),
            name: Some("ripple-server".to_string()),
        }
    }
}

fn default_urls() -> Vec<String> {
    vec!["nats://localhost:4222".to_string()]
}

const fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> Option<u64> {
    Some(30)
}

fn default_max_reconnects() -> Option<usize> {
    Some(5)
}

const fn default_publish_timeout() -> u64 {
    5000
}

impl NatsConfig {
    pub fn primary_url(&self) -> &str {
        self.urls
            .first()
            .map(|s| s.as_str())
            .unwrap_or("nats://localhost:4222")
    }
}

/// NATS implementation of the [`EventBus`] port.
#[derive(Clone)]
pub struct NatsEventBus {
    jetstream: JetStreamContext,
    publish_timeout: Duration,
}

impl NatsEventBus {
    /// Connects to NATS and builds the gateway.
    ///
    /// # Errors
    /// Returns an error if the initial connection fails.
    pub async fn new(config: NatsConfig) -> Result<Self, EventBusError> {
        let mut connect_options = ConnectOptions::default()
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs));

        if let Some(timeout_secs) = config.request_timeout_secs {
            connect_options =
                connect_options.request_timeout(Some(Duration::from_secs(timeout_secs)));
        }

        if let Some(name) = &config.name {
            connect_options = connect_options.name(name);
        }

        if let Some(max_reconnects) = config.max_reconnects {
            connect_options = connect_options.max_reconnects(max_reconnects);
        }

        let client = async_nats::connect_with_options(config.primary_url(), connect_options)
            .await
            .map_err(|e| EventBusError::ConnectionError(e.to_string()))?;

        let jetstream = async_nats::jetstream::new(client);

        Ok(Self {
            jetstream,
            publish_timeout: Duration::from_millis(config.publish_timeout_ms),
        })
    }
}

#[async_trait]
impl EventBus for NatsEventBus {
    /// Publishes a payload to a subject, waiting for the JetStream ack
    /// so delivery is at-least-once. The whole call is bounded by the
    /// configured publish timeout so a slow broker cannot stall a
    /// dispatcher indefinitely.
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), EventBusError> {
        let publish = async {
            let ack = self
                .jetstream
                .publish(subject.to_string(), payload.to_vec().into())
                .await
                .map_err(|e| EventBusError::PublishError {
                    subject: subject.to_string(),
                    cause: e.to_string(),
                })?;

            ack.await.map_err(|e| EventBusError::PublishError {
                subject: subject.to_string(),
                cause: e.to_string(),
            })
        };

        match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(result) => {
                result?;
                debug!(subject = %subject, "Published to broker");
                Ok(())
            }
            Err(_) => Err(EventBusError::PublishTimeout {
                subject: subject.to_string(),
                timeout_ms: self.publish_timeout.as_millis() as u64,
            }),
        }
    }

    async fn setup_topology(&self) -> Result<(), EventBusError> {
        topology::ensure_topology(&self.jetstream)
            .await
            .map_err(|e| EventBusError::TopologyError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = NatsConfig::default();
        assert_eq!(config.primary_url(), "nats://localhost:4222");
        assert_eq!(config.connection_timeout_secs, 5);
        assert_eq!(config.publish_timeout_ms, 5000);
        assert_eq!(config.max_reconnects, Some(5));
    }

    #[test]
    fn test_config_deserializes_with_partial_input() {
        let config: NatsConfig =
            serde_json::from_str(r#"{"urls": ["nats://broker:4222"]}"#).unwrap();
        assert_eq!(config.primary_url(), "nats://broker:4222");
        assert_eq!(config.publish_timeout_ms, 5000);
    }

    #[tokio::test]
    #[ignore = "Requires NATS"]
    async fn test_publish_and_topology_roundtrip() {
        let bus = NatsEventBus::new(NatsConfig::default()).await.unwrap();
        bus.setup_topology().await.unwrap();
        // Second call must be a no-op, not an error.
        bus.setup_topology().await.unwrap();

        bus.publish("ripple.contacts.created", br#"{"event_type":"contact.created"}"#)
            .await
            .unwrap();
    }
}
