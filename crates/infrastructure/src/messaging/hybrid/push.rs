//! Push dispatcher.
//!
//! The latency half of the hybrid dispatch pair. Blocks on the outbox
//! LISTEN/NOTIFY channel and drains the pending backlog on every
//! signal, plus once on startup to cover anything committed while no
//! listener was up. Errors are logged and swallowed at the loop
//! boundary; the fallback sweeper is the correctness backstop, so a
//! failed pass here never needs to propagate anywhere.

use ripple_domain::outbox::{BatchDisposition, OutboxError, OutboxRepository};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::messaging::hybrid::pg_notify_listener::PgNotifyListener;
use crate::messaging::publisher::EntryPublisher;
use crate::persistence::outbox::postgres::OUTBOX_CHANNEL;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushDispatcherConfig {
    /// Maximum entries claimed per pass
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Notification channel to listen on
    #[serde(default = "default_channel")]
    pub channel: String,
}

fn default_batch_size() -> usize {
    50
}

fn default_channel() -> String {
    OUTBOX_CHANNEL.to_string()
}

impl Default for PushDispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            channel: default_channel(),
        }
    }
}

pub struct PushDispatcher {
    repository: Arc<dyn OutboxRepository>,
    publisher: Arc<EntryPublisher>,
    config: PushDispatcherConfig,
}

impl PushDispatcher {
    pub fn new(
        repository: Arc<dyn OutboxRepository>,
        publisher: Arc<EntryPublisher>,
        config: PushDispatcherConfig,
    ) -> Self {
        Self {
            repository,
            publisher,
            config,
        }
    }

    /// Runs until the shutdown signal fires.
    pub async fn run(&self, pool: &PgPool, mut shutdown: broadcast::Receiver<()>) {
        info!(
            channel = %self.config.channel,
            batch_size = self.config.batch_size,
            "Starting push dispatcher"
        );

        let mut listener = match PgNotifyListener::new(pool, &self.config.channel).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "Failed to open notification listener; push dispatch disabled");
                return;
            }
        };

        // Startup catch-up: anything committed while no listener was up.
        self.drain().await;

        loop {
            tokio::select! {
                notification = listener.recv() => {
                    match notification {
                        Ok(n) => {
                            debug!(payload = %n.payload(), "Outbox notification received");
                            self.drain().await;
                        }
                        Err(e) => {
                            // The listener reconnects internally; back off
                            // briefly and drain to cover the gap.
                            warn!(error = %e, "Notification listener error");
                            tokio::time::sleep(StdDuration::from_secs(1)).await;
                            self.drain().await;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Push dispatcher shutting down");
                    break;
                }
            }
        }
    }

    /// Claims and publishes batches until the backlog is empty. Returns
    /// the number of entries dispatched.
    pub async fn drain(&self) -> usize {
        let mut total = 0;
        loop {
            match self.process_batch().await {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) => {
                    error!(error = %e, "Push dispatch pass failed");
                    break;
                }
            }
        }
        total
    }

    /// One claim-publish-transition pass.
    ///
    /// Only successfully published entries transition to dispatched; on
    /// the first publish failure the rest of the batch is left pending,
    /// untouched, for a later pass or the fallback sweeper.
    async fn process_batch(&self) -> Result<usize, OutboxError> {
        let claim = self
            .repository
            .claim_pending_batch(self.config.batch_size, None)
            .await?;

        if claim.entries().is_empty() {
            claim.complete(BatchDisposition::default()).await?;
            return Ok(0);
        }

        let mut disposition = BatchDisposition::default();
        for entry in claim.entries() {
            match self.publisher.publish(entry).await {
                Ok(()) => disposition.record_dispatched(entry.id),
                Err(e) => {
                    warn!(
                        event_id = %entry.id,
                        event_type = %entry.event_type,
                        error = %e,
                        "Publish failed; leaving remainder of batch pending"
                    );
                    break;
                }
            }
        }

        let dispatched = disposition.dispatched.len();
        claim.complete(disposition).await?;
        Ok(dispatched)
    }
}
