//! PostgreSQL LISTEN/NOTIFY wrapper.
//!
//! The outbox insert trigger fires a NOTIFY on `outbox_work`; this
//! wrapper is the receiving end used by the push dispatcher. Signals
//! are fire-and-forget and never persisted, which is why the fallback
//! sweeper exists.

use sqlx::postgres::{PgListener, PgNotification};
use sqlx::PgPool;

use crate::persistence::outbox::postgres::OUTBOX_CHANNEL;

pub struct PgNotifyListener {
    listener: PgListener,
    channel: String,
}

impl PgNotifyListener {
    pub async fn new(pool: &PgPool, channel: &str) -> Result<Self, sqlx::Error> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(channel).await?;

        Ok(Self {
            listener,
            channel: channel.to_string(),
        })
    }

    /// Listener on the outbox insert channel.
    pub async fn for_outbox(pool: &PgPool) -> Result<Self, sqlx::Error> {
        Self::new(pool, OUTBOX_CHANNEL).await
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Receives the next notification, blocking until one arrives.
    pub async fn recv(&mut self) -> Result<PgNotification, sqlx::Error> {
        self.listener.recv().await
    }
}
