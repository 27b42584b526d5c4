//! Webhook subscription repository port.

use crate::webhooks::{
    DeliveryOutcome, NewWebhookSubscription, UpdateWebhookSubscription, WebhookError,
    WebhookSubscription,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for webhook subscription persistence.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(
        &self,
        tenant_id: Uuid,
        input: NewWebhookSubscription,
    ) -> Result<WebhookSubscription, WebhookError>;

    async fn update(
        &self,
        id: Uuid,
        input: UpdateWebhookSubscription,
    ) -> Result<WebhookSubscription, WebhookError>;

    async fn delete(&self, id: Uuid) -> Result<(), WebhookError>;

    async fn get(&self, id: Uuid) -> Result<Option<WebhookSubscription>, WebhookError>;

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<WebhookSubscription>, WebhookError>;

    /// All active subscriptions whose patterns match the event type.
    async fn find_active_matching(
        &self,
        event_type: &str,
    ) -> Result<Vec<WebhookSubscription>, WebhookError>;

    /// Records the outcome of one complete delivery sequence, updating
    /// the rolling counters exactly once.
    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: DeliveryOutcome,
    ) -> Result<(), WebhookError>;
}
