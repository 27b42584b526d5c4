//! Process wiring: storage, broker, dispatchers, HTTP server.

pub mod shutdown;

use anyhow::Context;
use async_trait::async_trait;
use ripple_domain::event_bus::EventBus;
use ripple_domain::events::EventEnvelope;
use ripple_domain::outbox::OutboxRepository;
use ripple_domain::webhooks::SubscriptionRepository;
use ripple_infrastructure::ingress::RawIngressBuffer;
use ripple_infrastructure::messaging::{
    EntryPublisher, FallbackSweeper, IdempotentConsumer, MessageHandler, NatsEventBus,
    PushDispatcher,
};
use ripple_infrastructure::persistence::{
    PostgresIdempotencyGuard, PostgresOutboxRepository, PostgresSubscriptionRepository,
};
use ripple_infrastructure::webhooks::{HttpWebhookSender, WebhookNotifier};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::api::{self, AppState};
use crate::config::RippleConfig;
use shutdown::GracefulShutdown;

/// Bridges broker-published events into the webhook notifier, behind
/// the idempotency guard so a re-published entry fans out only once.
struct WebhookFanout {
    notifier: Arc<WebhookNotifier>,
}

#[async_trait]
impl MessageHandler for WebhookFanout {
    async fn handle(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        self.notifier
            .notify_subscribers(&envelope.event_type, envelope.data.clone())
            .await;
        Ok(())
    }
}

pub async fn run(config: RippleConfig) -> anyhow::Result<()> {
    // Storage
    let pool = PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .connect(&config.database_url)
        .await
        .context("connecting to PostgreSQL")?;

    let outbox = Arc::new(PostgresOutboxRepository::new(pool.clone()));
    outbox.run_migrations().await.context("outbox migrations")?;

    let guard = Arc::new(PostgresIdempotencyGuard::new(pool.clone()));
    guard.run_migrations().await.context("idempotency migrations")?;

    let subscriptions = Arc::new(PostgresSubscriptionRepository::new(pool.clone()));
    subscriptions
        .run_migrations()
        .await
        .context("subscription migrations")?;

    // Broker gateway: one connection, declared topology, injected everywhere.
    let bus: Arc<dyn EventBus> = Arc::new(
        NatsEventBus::new(config.nats.clone())
            .await
            .context("connecting to NATS")?,
    );
    bus.setup_topology().await.context("declaring broker topology")?;

    // Webhook egress, fed from the dispatch path through the guard.
    let notifier = Arc::new(WebhookNotifier::new(
        subscriptions.clone() as Arc<dyn SubscriptionRepository>,
        Arc::new(HttpWebhookSender::new()),
        config.webhooks.clone(),
    ));
    let fanout = Arc::new(IdempotentConsumer::new(
        guard.clone(),
        Arc::new(WebhookFanout {
            notifier: notifier.clone(),
        }),
    ));
    let publisher = Arc::new(EntryPublisher::new(bus.clone()).with_fanout(fanout));

    let shutdown = GracefulShutdown::new();

    // Push dispatcher: latency path.
    let push = PushDispatcher::new(
        outbox.clone() as Arc<dyn OutboxRepository>,
        publisher.clone(),
        config.push.clone(),
    );
    let push_pool = pool.clone();
    let push_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        push.run(&push_pool, push_shutdown).await;
    });

    // Fallback sweeper: correctness path.
    let sweeper = FallbackSweeper::new(
        outbox.clone() as Arc<dyn OutboxRepository>,
        publisher,
        config.sweeper.clone(),
    );
    let sweeper_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        sweeper.run(sweeper_shutdown).await;
    });

    // HTTP surface
    let state = Arc::new(AppState {
        ingress: Arc::new(RawIngressBuffer::new(bus)),
        subscriptions: subscriptions as Arc<dyn SubscriptionRepository>,
        outbox: outbox as Arc<dyn OutboxRepository>,
    });
    let router = api::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "ripple server listening");

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        signal_shutdown.listen_for_signals().await;
    });

    let mut server_shutdown = shutdown.subscribe();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.recv().await;
            info!("HTTP server shutting down");
        })
        .await
        .context("HTTP server")?;

    Ok(())
}
