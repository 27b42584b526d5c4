//! In-memory test doubles for the pipeline's ports.
//!
//! Used by unit tests across the workspace so dispatcher and notifier
//! logic can be exercised without PostgreSQL or a broker. The outbox
//! fake mirrors the locking-read claim semantics of the real
//! repository: claimed entries are invisible to other claimants until
//! the claim is completed or dropped.

use crate::event_bus::{EventBus, EventBusError};
use crate::idempotency::{IdempotencyError, IdempotencyGuard};
use crate::outbox::{
    BatchDisposition, OutboxClaim, OutboxEntryInsert, OutboxEntryView, OutboxError,
    OutboxRepository, OutboxStats, OutboxStatus,
};
use crate::webhooks::{
    DeliveryOutcome, NewWebhookSubscription, SubscriptionRepository, UpdateWebhookSubscription,
    WebhookError, WebhookSubscription,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgTransaction;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct OutboxState {
    entries: Vec<OutboxEntryView>,
    claimed: HashSet<Uuid>,
}

/// In-memory [`OutboxRepository`] with claim/skip semantics.
#[derive(Clone, Default)]
pub struct InMemoryOutboxRepository {
    state: Arc<Mutex<OutboxState>>,
}

impl InMemoryOutboxRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, inserts: &[OutboxEntryInsert]) {
        let mut state = self.state.lock().unwrap();
        for insert in inserts {
            if let Some(key) = &insert.idempotency_key {
                // Insert-if-absent, like ON CONFLICT DO NOTHING.
                if state
                    .entries
                    .iter()
                    .any(|e| e.idempotency_key.as_ref() == Some(key))
                {
                    continue;
                }
            }
            state.entries.push(OutboxEntryView {
                id: Uuid::new_v4(),
                aggregate_id: insert.aggregate_id,
                aggregate_type: insert.aggregate_type,
                event_type: insert.event_type.clone(),
                payload: insert.payload.clone(),
                metadata: insert.metadata.clone(),
                idempotency_key: insert.idempotency_key.clone(),
                created_at: Utc::now(),
                dispatched_at: None,
                status: OutboxStatus::Pending,
                attempt_count: 0,
                last_error: None,
            });
        }
    }

    /// Backdates an entry so staleness filters can be tested.
    pub fn age_entry(&self, id: Uuid, by: chrono::Duration) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.id == id) {
            entry.created_at -= by;
        }
    }

    pub fn all_entries(&self) -> Vec<OutboxEntryView> {
        self.state.lock().unwrap().entries.clone()
    }
}

struct InMemoryClaim {
    state: Arc<Mutex<OutboxState>>,
    ids: Vec<Uuid>,
    entries: Vec<OutboxEntryView>,
    completed: bool,
}

impl Drop for InMemoryClaim {
    fn drop(&mut self) {
        if !self.completed {
            let mut state = self.state.lock().unwrap();
            for id in &self.ids {
                state.claimed.remove(id);
            }
        }
    }
}

#[async_trait]
impl OutboxClaim for InMemoryClaim {
    fn entries(&self) -> &[OutboxEntryView] {
        &self.entries
    }

    async fn complete(self: Box<Self>, disposition: BatchDisposition) -> Result<(), OutboxError> {
        let mut this = self;
        {
            let mut state = this.state.lock().unwrap();
            for id in &disposition.dispatched {
                if let Some(entry) = state.entries.iter_mut().find(|e| e.id == *id) {
                    entry.status = OutboxStatus::Dispatched;
                    entry.dispatched_at = Some(Utc::now());
                }
            }
            for (id, error) in &disposition.retried {
                if let Some(entry) = state.entries.iter_mut().find(|e| e.id == *id) {
                    entry.attempt_count += 1;
                    entry.last_error = Some(error.clone());
                }
            }
            for (id, error) in &disposition.failed {
                if let Some(entry) = state.entries.iter_mut().find(|e| e.id == *id) {
                    entry.status = OutboxStatus::Failed;
                    entry.attempt_count += 1;
                    entry.last_error = Some(error.clone());
                }
            }
            for id in &this.ids {
                state.claimed.remove(id);
            }
        }
        this.completed = true;
        Ok(())
    }
}

#[async_trait]
impl OutboxRepository for InMemoryOutboxRepository {
    async fn append_with_tx(
        &self,
        _tx: &mut PgTransaction<'_>,
        entries: &[OutboxEntryInsert],
    ) -> Result<(), OutboxError> {
        self.insert(entries);
        Ok(())
    }

    async fn append(&self, entries: &[OutboxEntryInsert]) -> Result<(), OutboxError> {
        self.insert(entries);
        Ok(())
    }

    async fn claim_pending_batch(
        &self,
        limit: usize,
        older_than: Option<chrono::Duration>,
    ) -> Result<Box<dyn OutboxClaim>, OutboxError> {
        let mut state = self.state.lock().unwrap();
        let cutoff = older_than.map(|d| Utc::now() - d);

        let mut candidates: Vec<OutboxEntryView> = state
            .entries
            .iter()
            .filter(|e| e.is_pending() && !state.claimed.contains(&e.id))
            .filter(|e| cutoff.map_or(true, |c| e.created_at < c))
            .cloned()
            .collect();
        candidates.sort_by_key(|e| e.created_at);
        candidates.truncate(limit);

        let ids: Vec<Uuid> = candidates.iter().map(|e| e.id).collect();
        for id in &ids {
            state.claimed.insert(*id);
        }

        Ok(Box::new(InMemoryClaim {
            state: Arc::clone(&self.state),
            ids,
            entries: candidates,
            completed: false,
        }))
    }

    async fn count_pending(&self) -> Result<u64, OutboxError> {
        let state = self.state.lock().unwrap();
        Ok(state.entries.iter().filter(|e| e.is_pending()).count() as u64)
    }

    async fn stats(&self) -> Result<OutboxStats, OutboxError> {
        let state = self.state.lock().unwrap();
        let pending_count = state.entries.iter().filter(|e| e.is_pending()).count() as u64;
        let dispatched_count = state.entries.iter().filter(|e| e.is_dispatched()).count() as u64;
        let failed_count = state
            .entries
            .iter()
            .filter(|e| matches!(e.status, OutboxStatus::Failed))
            .count() as u64;
        let oldest_pending_age_seconds = state
            .entries
            .iter()
            .filter(|e| e.is_pending())
            .map(|e| e.age().num_seconds())
            .max();

        Ok(OutboxStats {
            pending_count,
            dispatched_count,
            failed_count,
            oldest_pending_age_seconds,
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxEntryView>, OutboxError> {
        let state = self.state.lock().unwrap();
        Ok(state.entries.iter().find(|e| e.id == id).cloned())
    }
}

/// In-memory [`EventBus`] that records every publish.
#[derive(Default)]
pub struct RecordingEventBus {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    fail_publish: AtomicBool,
    topology_ready: AtomicBool,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail, simulating a broker outage.
    pub fn set_failing(&self, failing: bool) {
        self.fail_publish.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_subjects(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(s, _)| s.clone())
            .collect()
    }

    pub fn topology_ready(&self) -> bool {
        self.topology_ready.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), EventBusError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(EventBusError::PublishError {
                subject: subject.to_string(),
                cause: "simulated broker outage".to_string(),
            });
        }
        self.published
            .lock()
            .unwrap()
            .push((subject.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn setup_topology(&self) -> Result<(), EventBusError> {
        self.topology_ready.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory [`IdempotencyGuard`] backed by a hash set.
#[derive(Default)]
pub struct InMemoryIdempotencyGuard {
    seen: Mutex<HashSet<String>>,
}

impl InMemoryIdempotencyGuard {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyGuard for InMemoryIdempotencyGuard {
    async fn already_processed(&self, fingerprint: &str) -> Result<bool, IdempotencyError> {
        Ok(self.seen.lock().unwrap().contains(fingerprint))
    }

    async fn mark_processed(&self, fingerprint: &str) -> Result<bool, IdempotencyError> {
        Ok(self.seen.lock().unwrap().insert(fingerprint.to_string()))
    }
}

/// In-memory [`SubscriptionRepository`].
#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: Mutex<HashMap<Uuid, WebhookSubscription>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a fully-formed subscription, bypassing validation.
    pub fn seed(&self, subscription: WebhookSubscription) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id, subscription);
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn create(
        &self,
        tenant_id: Uuid,
        input: NewWebhookSubscription,
    ) -> Result<WebhookSubscription, WebhookError> {
        input.validate()?;
        let now = Utc::now();
        let subscription = WebhookSubscription {
            id: Uuid::new_v4(),
            tenant_id,
            name: input.name,
            url: input.url,
            events: input.events,
            secret: input.secret,
            headers: input.headers,
            retry_count: input.retry_count,
            timeout_secs: input.timeout_secs,
            active: input.active,
            success_count: 0,
            failure_count: 0,
            last_triggered_at: None,
            last_success_at: None,
            last_failure_at: None,
            created_at: now,
            updated_at: now,
        };
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn update(
        &self,
        id: Uuid,
        input: UpdateWebhookSubscription,
    ) -> Result<WebhookSubscription, WebhookError> {
        input.validate()?;
        let mut subs = self.subscriptions.lock().unwrap();
        let sub = subs.get_mut(&id).ok_or(WebhookError::NotFound(id))?;

        if let Some(name) = input.name {
            sub.name = name;
        }
        if let Some(url) = input.url {
            sub.url = url;
        }
        if let Some(events) = input.events {
            sub.events = events;
        }
        if let Some(secret) = input.secret {
            sub.secret = secret;
        }
        if let Some(headers) = input.headers {
            sub.headers = headers;
        }
        if let Some(retry_count) = input.retry_count {
            sub.retry_count = retry_count;
        }
        if let Some(timeout_secs) = input.timeout_secs {
            sub.timeout_secs = timeout_secs;
        }
        if let Some(active) = input.active {
            sub.active = active;
        }
        sub.updated_at = Utc::now();
        Ok(sub.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), WebhookError> {
        self.subscriptions
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(WebhookError::NotFound(id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<WebhookSubscription>, WebhookError> {
        Ok(self.subscriptions.lock().unwrap().get(&id).cloned())
    }

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<WebhookSubscription>, WebhookError> {
        let mut subs: Vec<WebhookSubscription> = self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.tenant_id == tenant_id)
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.created_at);
        Ok(subs)
    }

    async fn find_active_matching(
        &self,
        event_type: &str,
    ) -> Result<Vec<WebhookSubscription>, WebhookError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.should_notify(event_type))
            .cloned()
            .collect())
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: DeliveryOutcome,
    ) -> Result<(), WebhookError> {
        let mut subs = self.subscriptions.lock().unwrap();
        let sub = subs.get_mut(&id).ok_or(WebhookError::NotFound(id))?;
        let now = Utc::now();
        sub.last_triggered_at = Some(now);
        match outcome {
            DeliveryOutcome::Success => {
                sub.success_count += 1;
                sub.last_success_at = Some(now);
            }
            DeliveryOutcome::Failure => {
                sub.failure_count += 1;
                sub.last_failure_at = Some(now);
            }
        }
        Ok(())
    }
}
