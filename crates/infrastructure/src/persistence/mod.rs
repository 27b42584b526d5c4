//! PostgreSQL persistence adapters.

pub mod idempotency;
pub mod outbox;
pub mod subscriptions;

pub use idempotency::PostgresIdempotencyGuard;
pub use outbox::PostgresOutboxRepository;
pub use subscriptions::PostgresSubscriptionRepository;
