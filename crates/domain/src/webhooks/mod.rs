//! Webhook subscriptions: model, pattern matching and repository port.

pub mod repository;
pub mod subscription;

pub use repository::*;
pub use subscription::*;
