//! Webhook subscription model.
//!
//! A subscription is a tenant-owned registration of interest in a set
//! of event types. The notifier mutates it only to update the rolling
//! delivery counters, and only once per delivery sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Error types for webhook operations.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Subscription not found: {0}")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Delivery error: {0}")]
    Delivery(String),
}

/// Checks an event type against a subscription pattern.
///
/// Patterns are either exact (`contact.created`) or trailing-wildcard
/// prefixes (`contact.*`, `*`).
pub fn pattern_matches(pattern: &str, event_type: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return event_type.starts_with(prefix);
    }
    pattern == event_type
}

/// A registered webhook subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub url: String,
    /// Event-type patterns, exact or trailing-wildcard.
    pub events: Vec<String>,
    /// HMAC secret for payload signing, when configured.
    pub secret: Option<String>,
    /// Custom headers attached to every delivery.
    pub headers: HashMap<String, String>,
    /// Delivery attempts per event (including the first).
    pub retry_count: u32,
    /// Per-attempt HTTP timeout.
    pub timeout_secs: u64,
    pub active: bool,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookSubscription {
    /// Whether this subscription should receive an event of the given type.
    pub fn should_notify(&self, event_type: &str) -> bool {
        if !self.active {
            return false;
        }
        self.events.iter().any(|p| pattern_matches(p, event_type))
    }
}

/// Input for creating a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWebhookSubscription {
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_retry_count() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_active() -> bool {
    true
}

impl NewWebhookSubscription {
    /// Synchronous validation performed before anything is persisted.
    pub fn validate(&self) -> Result<(), WebhookError> {
        if self.name.trim().is_empty() {
            return Err(WebhookError::Validation("name must not be empty".into()));
        }
        if self.url.trim().is_empty() {
            return Err(WebhookError::Validation("url must not be empty".into()));
        }
        if self.events.is_empty() {
            return Err(WebhookError::Validation(
                "at least one event pattern is required".into(),
            ));
        }
        Ok(())
    }
}

/// Partial update for a subscription.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWebhookSubscription {
    pub name: Option<String>,
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub secret: Option<Option<String>>,
    pub headers: Option<HashMap<String, String>>,
    pub retry_count: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub active: Option<bool>,
}

impl UpdateWebhookSubscription {
    pub fn validate(&self) -> Result<(), WebhookError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(WebhookError::Validation("name must not be empty".into()));
            }
        }
        if let Some(url) = &self.url {
            if url.trim().is_empty() {
                return Err(WebhookError::Validation("url must not be empty".into()));
            }
        }
        if let Some(events) = &self.events {
            if events.is_empty() {
                return Err(WebhookError::Validation(
                    "at least one event pattern is required".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Result of one complete delivery sequence against a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A 2xx response was received within the retry budget.
    Success,
    /// All configured attempts failed.
    Failure,
}
