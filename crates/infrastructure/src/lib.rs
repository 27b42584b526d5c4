// Ripple - Infrastructure Layer
//
// Adapters behind the domain ports:
// - persistence: PostgreSQL outbox, idempotency guard and subscriptions
// - messaging: NATS JetStream gateway, push dispatcher, fallback sweeper
// - webhooks: HMAC signing and the retrying notifier
// - ingress: raw inbound webhook buffer

pub mod ingress;
pub mod messaging;
pub mod persistence;
pub mod webhooks;
