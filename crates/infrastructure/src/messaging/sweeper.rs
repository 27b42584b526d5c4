//! Fallback sweeper.
//!
//! The correctness half of the hybrid dispatch pair. The notification
//! channel is fire-and-forget, so any listener downtime or dropped
//! signal would strand a committed entry; this periodic sweep claims
//! anything pending beyond the staleness threshold and republishes it.
//! State lives entirely in the outbox table, so the sweep survives
//! process restarts and any number of instances can run it.

use chrono::Duration;
use ripple_domain::outbox::{BatchDisposition, OutboxError, OutboxRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::messaging::hybrid::backoff::BackoffConfig;
use crate::messaging::publisher::EntryPublisher;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Maximum entries claimed per sweep
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds between sweeps
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Only entries pending longer than this are swept; covers the
    /// window where the push dispatcher is still expected to deliver
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,

    /// Retry pacing and attempt budget
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_batch_size() -> usize {
    50
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_staleness_secs() -> u64 {
    60
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval_secs(),
            staleness_secs: default_staleness_secs(),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Tally of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub dispatched: usize,
    pub retried: usize,
    pub failed: usize,
}

impl SweepOutcome {
    pub fn is_empty(&self) -> bool {
        self.dispatched == 0 && self.retried == 0 && self.failed == 0
    }
}

pub struct FallbackSweeper {
    repository: Arc<dyn OutboxRepository>,
    publisher: Arc<EntryPublisher>,
    config: SweeperConfig,
}

impl FallbackSweeper {
    pub fn new(
        repository: Arc<dyn OutboxRepository>,
        publisher: Arc<EntryPublisher>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            repository,
            publisher,
            config,
        }
    }

    /// Runs sweeps on the configured interval until shutdown.
    ///
    /// When a sweep makes no progress at all (broker down), the next
    /// sweep is pushed out by the exponential backoff instead of the
    /// fixed interval.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            staleness_secs = self.config.staleness_secs,
            backoff = %self.config.backoff,
            "Starting fallback sweeper"
        );

        let mut ticker = interval(std::time::Duration::from_secs(self.config.poll_interval_secs));
        let mut consecutive_stalls: i32 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.sweep_once().await;

                    if outcome.retried > 0 && outcome.dispatched == 0 {
                        consecutive_stalls += 1;
                        let delay = self.config.backoff.calculate_delay(consecutive_stalls - 1);
                        warn!(
                            stalls = consecutive_stalls,
                            delay_secs = delay.num_seconds(),
                            "Sweep made no progress; backing off"
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(delay.to_std().unwrap_or_default()) => {}
                            _ = shutdown.recv() => {
                                info!("Fallback sweeper shutting down");
                                break;
                            }
                        }
                    } else {
                        consecutive_stalls = 0;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Fallback sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// One sweep: claim stale pending entries and republish them.
    ///
    /// Public so an external scheduler can drive sweeps directly; the
    /// built-in interval loop is one caller among possible others.
    pub async fn sweep_once(&self) -> SweepOutcome {
        let staleness = Duration::seconds(self.config.staleness_secs as i64);

        match self.process_stale_batch(staleness).await {
            Ok(outcome) => {
                if !outcome.is_empty() {
                    debug!(
                        dispatched = outcome.dispatched,
                        retried = outcome.retried,
                        failed = outcome.failed,
                        "Sweep completed"
                    );
                }
                outcome
            }
            Err(e) => {
                error!(error = %e, "Sweep failed");
                SweepOutcome::default()
            }
        }
    }

    async fn process_stale_batch(&self, staleness: Duration) -> Result<SweepOutcome, OutboxError> {
        let claim = self
            .repository
            .claim_pending_batch(self.config.batch_size, Some(staleness))
            .await?;

        if claim.entries().is_empty() {
            claim.complete(BatchDisposition::default()).await?;
            return Ok(SweepOutcome::default());
        }

        let mut disposition = BatchDisposition::default();
        let mut outcome = SweepOutcome::default();

        for entry in claim.entries() {
            match self.publisher.publish(entry).await {
                Ok(()) => {
                    disposition.record_dispatched(entry.id);
                    outcome.dispatched += 1;
                }
                Err(e @ OutboxError::Serialization(_)) => {
                    // Corrupt payload: retrying cannot succeed. Route to
                    // the dead-letter stream instead of cycling forever.
                    error!(
                        event_id = %entry.id,
                        event_type = %entry.event_type,
                        error = %e,
                        "Corrupt outbox payload; dead-lettering"
                    );
                    self.publisher.dead_letter(entry, &e.to_string()).await;
                    disposition.record_failed(entry.id, e.to_string());
                    outcome.failed += 1;
                }
                Err(e) if self.config.backoff.can_retry(entry.attempt_count) => {
                    warn!(
                        event_id = %entry.id,
                        event_type = %entry.event_type,
                        attempt = entry.attempt_count,
                        error = %e,
                        "Republish failed; will retry"
                    );
                    disposition.record_retry(entry.id, e.to_string());
                    outcome.retried += 1;
                }
                Err(e) => {
                    // Terminal. Requires operator intervention; the entry
                    // stays in the table for replay once the cause is fixed.
                    error!(
                        event_id = %entry.id,
                        event_type = %entry.event_type,
                        attempts = entry.attempt_count,
                        error = %e,
                        "Outbox entry exhausted its attempts; marking failed"
                    );
                    self.publisher.dead_letter(entry, &e.to_string()).await;
                    disposition.record_failed(entry.id, e.to_string());
                    outcome.failed += 1;
                }
            }
        }

        claim.complete(disposition).await?;
        Ok(outcome)
    }
}
