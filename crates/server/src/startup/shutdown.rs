//! Graceful shutdown coordinator.
//!
//! One broadcast channel every long-running loop subscribes to: the
//! push dispatcher, the fallback sweeper and the HTTP server all stop
//! accepting work when it fires and drain whatever batch is in flight.
//! In-flight webhook retries are not awaited; an entry whose row never
//! reached `dispatched` is re-delivered by the sweeper after restart.

use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

#[derive(Clone)]
pub struct GracefulShutdown {
    tx: broadcast::Sender<()>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Triggers shutdown programmatically.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Blocks until SIGINT or SIGTERM, then triggers shutdown.
    pub async fn listen_for_signals(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "Failed to install SIGINT handler");
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => error!(error = %e, "Failed to install SIGTERM handler"),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("SIGINT received"),
            _ = terminate => info!("SIGTERM received"),
        }

        self.trigger();
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_reaches_all_subscribers() {
        let shutdown = GracefulShutdown::new();
        let mut first = shutdown.subscribe();
        let mut second = shutdown.subscribe();

        shutdown.trigger();

        first.recv().await.unwrap();
        second.recv().await.unwrap();
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_trigger() {
        let shutdown = GracefulShutdown::new();
        shutdown.trigger();

        // Broadcast semantics: subscribe after the send sees nothing,
        // which is why every loop subscribes before spawning.
        let mut late = shutdown.subscribe();
        shutdown.trigger();
        late.recv().await.unwrap();
    }
}
