//! Messaging adapters: broker gateway, dispatchers and consumer plumbing.

pub mod consumer;
pub mod hybrid;
pub mod nats;
pub mod publisher;
pub mod sweeper;
pub mod topology;

pub use consumer::{IdempotentConsumer, MessageHandler, ProcessOutcome};
pub use hybrid::{BackoffConfig, PushDispatcher, PushDispatcherConfig};
pub use nats::{NatsConfig, NatsEventBus};
pub use publisher::EntryPublisher;
pub use sweeper::{FallbackSweeper, SweepOutcome, SweeperConfig};
