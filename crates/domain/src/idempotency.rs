//! Idempotency guard port.
//!
//! The pipeline guarantees at-least-once delivery, not exactly-once
//! side effects. Consumers check the guard before applying effects and
//! mark the fingerprint atomically with (or immediately after, in the
//! same transaction as) applying them. A crash between "apply" and
//! "mark" re-applies only if the effect itself is idempotent at the
//! business layer; that boundary is deliberate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdempotencyError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Infrastructure error: {message}")]
    Infrastructure { message: String },
}

/// A persisted "this message was already applied" record.
#[derive(Debug, Clone)]
pub struct ProcessedMessageRecord {
    pub fingerprint: String,
    pub processed_at: DateTime<Utc>,
}

/// Persisted set of processed-message fingerprints.
///
/// Backed by a uniqueness constraint so concurrent consumers racing on
/// the same redelivered message cannot both win.
#[async_trait]
pub trait IdempotencyGuard: Send + Sync {
    /// Whether the fingerprint has already been processed.
    async fn already_processed(&self, fingerprint: &str) -> Result<bool, IdempotencyError>;

    /// Tries to mark the fingerprint as processed.
    ///
    /// Returns `true` iff this caller won the insert race; `false`
    /// means another consumer already marked it.
    async fn mark_processed(&self, fingerprint: &str) -> Result<bool, IdempotencyError>;
}
