//! Webhook egress: payload signing and the retrying notifier.

pub mod notifier;
pub mod signer;

pub use notifier::{HttpWebhookSender, WebhookNotifier, WebhookNotifierConfig, WebhookSender};
pub use signer::{WebhookSigner, SIGNATURE_HEADER};
