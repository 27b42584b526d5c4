//! Webhook notifier.
//!
//! Fans an event out to every matching subscription, one independent
//! task per subscriber so a slow endpoint never blocks the rest. Each
//! task runs a full attempt sequence with linear backoff and records
//! the outcome against the subscription's rolling counters exactly
//! once, after the sequence concludes. Nothing here ever raises an
//! error to the event producer.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use ripple_domain::events::EventEnvelope;
use ripple_domain::webhooks::{DeliveryOutcome, SubscriptionRepository, WebhookError, WebhookSubscription};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::webhooks::signer::{WebhookSigner, SIGNATURE_HEADER};

const RIPPLE_USER_AGENT: &str = "ripple/1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookNotifierConfig {
    /// Linear backoff unit: attempt N waits N * this many seconds
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_retry_delay_secs() -> u64 {
    2
}

impl Default for WebhookNotifierConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

/// Transport seam for a single delivery attempt.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// POSTs the body to the subscription's URL. Returns the HTTP
    /// status code; transport-level failures are errors.
    async fn send(
        &self,
        subscription: &WebhookSubscription,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<u16, WebhookError>;
}

/// reqwest-backed sender honoring the per-subscription timeout.
pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpWebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(
        &self,
        subscription: &WebhookSubscription,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<u16, WebhookError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(RIPPLE_USER_AGENT));

        for (name, value) in &subscription.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WebhookError::Delivery(format!("invalid header name: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| WebhookError::Delivery(format!("invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        if let Some(signature) = signature {
            headers.insert(
                HeaderName::from_bytes(SIGNATURE_HEADER.as_bytes())
                    .map_err(|e| WebhookError::Delivery(e.to_string()))?,
                HeaderValue::from_str(signature)
                    .map_err(|e| WebhookError::Delivery(e.to_string()))?,
            );
        }

        let response = self
            .client
            .post(&subscription.url)
            .timeout(Duration::from_secs(subscription.timeout_secs))
            .headers(headers)
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| WebhookError::Delivery(e.to_string()))?;

        Ok(response.status().as_u16())
    }
}

#[derive(Clone)]
pub struct WebhookNotifier {
    subscriptions: Arc<dyn SubscriptionRepository>,
    sender: Arc<dyn WebhookSender>,
    config: WebhookNotifierConfig,
}

impl WebhookNotifier {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        sender: Arc<dyn WebhookSender>,
        config: WebhookNotifierConfig,
    ) -> Self {
        Self {
            subscriptions,
            sender,
            config,
        }
    }

    /// Fans the event out to every matching active subscription.
    ///
    /// Fire-and-forget from the caller's perspective: each delivery
    /// sequence runs in its own task, and no failure propagates back.
    /// Returns the number of deliveries started.
    pub async fn notify_subscribers(&self, event_type: &str, data: serde_json::Value) -> usize {
        let matching = match self.subscriptions.find_active_matching(event_type).await {
            Ok(subs) => subs,
            Err(e) => {
                error!(event_type = %event_type, error = %e, "Subscription lookup failed");
                return 0;
            }
        };

        if matching.is_empty() {
            return 0;
        }

        let envelope = EventEnvelope::new(event_type, data);
        let body = match envelope.to_json_bytes() {
            Ok(body) => body,
            Err(e) => {
                error!(event_type = %event_type, error = %e, "Envelope serialization failed");
                return 0;
            }
        };

        let started = matching.len();
        for subscription in matching {
            let notifier = self.clone();
            let body = body.clone();
            tokio::spawn(async move {
                notifier.deliver_sequence(&subscription, &body).await;
            });
        }
        started
    }

    /// Runs one complete attempt sequence against one subscriber and
    /// records the outcome exactly once. Public so tests (and callers
    /// needing determinism) can await a sequence directly.
    pub async fn deliver_sequence(
        &self,
        subscription: &WebhookSubscription,
        body: &[u8],
    ) -> DeliveryOutcome {
        let signature = subscription
            .secret
            .as_deref()
            .map(|secret| WebhookSigner::new(secret).sign(body));

        let attempts = subscription.retry_count.max(1);
        let mut outcome = DeliveryOutcome::Failure;

        for attempt in 1..=attempts {
            match self.sender.send(subscription, body, signature.as_deref()).await {
                Ok(status) if (200..300).contains(&status) => {
                    debug!(
                        subscription_id = %subscription.id,
                        url = %subscription.url,
                        attempt,
                        status,
                        "Webhook delivered"
                    );
                    outcome = DeliveryOutcome::Success;
                    break;
                }
                Ok(status) => {
                    warn!(
                        subscription_id = %subscription.id,
                        url = %subscription.url,
                        attempt,
                        status,
                        "Webhook attempt rejected"
                    );
                }
                Err(e) => {
                    warn!(
                        subscription_id = %subscription.id,
                        url = %subscription.url,
                        attempt,
                        error = %e,
                        "Webhook attempt failed"
                    );
                }
            }

            if attempt < attempts {
                // Linear backoff: one delay unit times the attempt number.
                let delay = Duration::from_secs(self.config.retry_delay_secs * attempt as u64);
                tokio::time::sleep(delay).await;
            }
        }

        if let Err(e) = self
            .subscriptions
            .record_outcome(subscription.id, outcome)
            .await
        {
            error!(
                subscription_id = %subscription.id,
                error = %e,
                "Failed to record delivery outcome"
            );
        }

        outcome
    }
}
