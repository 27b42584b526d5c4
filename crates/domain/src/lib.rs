// Ripple - Domain Layer
//
// Models and ports for the event-delivery pipeline:
// - events: domain event taxonomy and the wire envelope
// - event_bus: broker gateway port
// - outbox: transactional outbox model and repository port
// - webhooks: subscription model, pattern matching and repository port
// - idempotency: processed-message guard port
// - ingress: inbound third-party payload envelope

pub mod event_bus;
pub mod events;
pub mod idempotency;
pub mod ingress;
pub mod outbox;
pub mod testing;
pub mod webhooks;

pub use event_bus::*;
pub use events::*;
pub use idempotency::*;
pub use ingress::*;
pub use outbox::*;
pub use webhooks::*;
