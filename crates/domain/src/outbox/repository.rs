//! Outbox repository port.
//!
//! Both dispatch strategies (push and fallback) share one claim
//! primitive: `claim_pending_batch`. A claim is a locking read that
//! skips rows already locked by another dispatcher instance, so
//! multiple processes can drain the same backlog without publishing a
//! row twice. The claim stays open while the caller publishes the batch
//! and is settled exactly once through [`OutboxClaim::complete`];
//! dropping a claim without completing it releases the rows unchanged.

use crate::outbox::{OutboxEntryInsert, OutboxEntryView, OutboxError};
use async_trait::async_trait;
use sqlx::PgTransaction;
use uuid::Uuid;

/// How each entry of a claimed batch ended up.
#[derive(Debug, Default)]
pub struct BatchDisposition {
    /// Published successfully; transition to `Dispatched`.
    pub dispatched: Vec<Uuid>,
    /// Publish failed; attempt count is incremented, status stays `Pending`.
    pub retried: Vec<(Uuid, String)>,
    /// Attempts exhausted; transition to `Failed` (terminal).
    pub failed: Vec<(Uuid, String)>,
}

impl BatchDisposition {
    pub fn record_dispatched(&mut self, id: Uuid) {
        self.dispatched.push(id);
    }

    pub fn record_retry(&mut self, id: Uuid, error: impl Into<String>) {
        self.retried.push((id, error.into()));
    }

    pub fn record_failed(&mut self, id: Uuid, error: impl Into<String>) {
        self.failed.push((id, error.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.dispatched.is_empty() && self.retried.is_empty() && self.failed.is_empty()
    }
}

/// A batch of outbox entries claimed by one dispatcher instance.
#[async_trait]
pub trait OutboxClaim: Send {
    /// Entries in the batch, ordered by creation time.
    fn entries(&self) -> &[OutboxEntryView];

    /// Applies the status transitions and releases the claim.
    async fn complete(self: Box<Self>, disposition: BatchDisposition) -> Result<(), OutboxError>;
}

/// Statistics about outbox entries, for monitoring.
#[derive(Debug, Clone)]
pub struct OutboxStats {
    pub pending_count: u64,
    pub dispatched_count: u64,
    pub failed_count: u64,
    pub oldest_pending_age_seconds: Option<i64>,
}

impl OutboxStats {
    pub fn total(&self) -> u64 {
        self.pending_count + self.dispatched_count + self.failed_count
    }

    pub fn has_pending(&self) -> bool {
        self.pending_count > 0
    }
}

/// Repository for outbox entry persistence.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Inserts entries within the caller's existing transaction.
    ///
    /// This is the write half of the transactional outbox: the business
    /// mutation and the event record commit or roll back together. No
    /// network I/O happens on this path.
    async fn append_with_tx(
        &self,
        tx: &mut PgTransaction<'_>,
        entries: &[OutboxEntryInsert],
    ) -> Result<(), OutboxError>;

    /// Inserts entries in a transaction owned by the repository.
    ///
    /// Convenience for callers without a surrounding transaction.
    async fn append(&self, entries: &[OutboxEntryInsert]) -> Result<(), OutboxError>;

    /// Claims up to `limit` pending entries ordered by creation time.
    ///
    /// `older_than` restricts the claim to entries stale beyond the
    /// given age; the fallback dispatcher passes its staleness
    /// threshold here while the push dispatcher passes `None`.
    async fn claim_pending_batch(
        &self,
        limit: usize,
        older_than: Option<chrono::Duration>,
    ) -> Result<Box<dyn OutboxClaim>, OutboxError>;

    async fn count_pending(&self) -> Result<u64, OutboxError>;

    async fn stats(&self) -> Result<OutboxStats, OutboxError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxEntryView>, OutboxError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::OutboxStatus;
    use crate::testing::InMemoryOutboxRepository;

    fn sample_entry(event_type: &str) -> OutboxEntryInsert {
        OutboxEntryInsert::for_contact(
            Uuid::new_v4(),
            event_type.to_string(),
            serde_json::json!({"test": "data"}),
            None,
        )
    }

    #[tokio::test]
    async fn test_append_and_claim() {
        let repo = InMemoryOutboxRepository::new();
        repo.append(&[sample_entry("contact.created")]).await.unwrap();

        let claim = repo.claim_pending_batch(10, None).await.unwrap();
        assert_eq!(claim.entries().len(), 1);
        assert_eq!(claim.entries()[0].event_type, "contact.created");
    }

    #[tokio::test]
    async fn test_claimed_entries_are_skipped_by_second_claimant() {
        let repo = InMemoryOutboxRepository::new();
        repo.append(&[sample_entry("contact.created")]).await.unwrap();

        let first = repo.claim_pending_batch(10, None).await.unwrap();
        assert_eq!(first.entries().len(), 1);

        // A concurrent dispatcher sees nothing while the claim is open.
        let second = repo.claim_pending_batch(10, None).await.unwrap();
        assert!(second.entries().is_empty());
    }

    #[tokio::test]
    async fn test_dropping_claim_releases_entries() {
        let repo = InMemoryOutboxRepository::new();
        repo.append(&[sample_entry("contact.created")]).await.unwrap();

        {
            let claim = repo.claim_pending_batch(10, None).await.unwrap();
            assert_eq!(claim.entries().len(), 1);
        }

        let claim = repo.claim_pending_batch(10, None).await.unwrap();
        assert_eq!(claim.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_complete_marks_dispatched() {
        let repo = InMemoryOutboxRepository::new();
        repo.append(&[sample_entry("contact.created")]).await.unwrap();

        let claim = repo.claim_pending_batch(10, None).await.unwrap();
        let id = claim.entries()[0].id;

        let mut disposition = BatchDisposition::default();
        disposition.record_dispatched(id);
        claim.complete(disposition).await.unwrap();

        let entry = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(entry.status, OutboxStatus::Dispatched);
        assert!(entry.dispatched_at.is_some());

        let claim = repo.claim_pending_batch(10, None).await.unwrap();
        assert!(claim.entries().is_empty());
    }

    #[tokio::test]
    async fn test_retry_keeps_entry_pending_and_counts_attempt() {
        let repo = InMemoryOutboxRepository::new();
        repo.append(&[sample_entry("contact.created")]).await.unwrap();

        let claim = repo.claim_pending_batch(10, None).await.unwrap();
        let id = claim.entries()[0].id;

        let mut disposition = BatchDisposition::default();
        disposition.record_retry(id, "broker unreachable");
        claim.complete(disposition).await.unwrap();

        let entry = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(entry.status, OutboxStatus::Pending);
        assert_eq!(entry.attempt_count, 1);
        assert_eq!(entry.last_error.as_deref(), Some("broker unreachable"));
    }

    #[tokio::test]
    async fn test_failed_is_terminal() {
        let repo = InMemoryOutboxRepository::new();
        repo.append(&[sample_entry("contact.created")]).await.unwrap();

        let claim = repo.claim_pending_batch(10, None).await.unwrap();
        let id = claim.entries()[0].id;

        let mut disposition = BatchDisposition::default();
        disposition.record_failed(id, "attempts exhausted");
        claim.complete(disposition).await.unwrap();

        let entry = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(entry.status, OutboxStatus::Failed);

        let claim = repo.claim_pending_batch(10, None).await.unwrap();
        assert!(claim.entries().is_empty());
    }

    #[tokio::test]
    async fn test_older_than_filters_fresh_entries() {
        let repo = InMemoryOutboxRepository::new();
        repo.append(&[sample_entry("contact.created")]).await.unwrap();

        // A just-written entry is not stale.
        let claim = repo
            .claim_pending_batch(10, Some(chrono::Duration::seconds(60)))
            .await
            .unwrap();
        assert!(claim.entries().is_empty());

        // But it is visible without the staleness filter.
        let claim = repo.claim_pending_batch(10, None).await.unwrap();
        assert_eq!(claim.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let repo = InMemoryOutboxRepository::new();
        for _ in 0..3 {
            repo.append(&[sample_entry("contact.created")]).await.unwrap();
        }

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.pending_count, 3);
        assert_eq!(stats.dispatched_count, 0);
        assert_eq!(stats.failed_count, 0);
        assert_eq!(stats.total(), 3);
        assert!(stats.has_pending());
    }
}
