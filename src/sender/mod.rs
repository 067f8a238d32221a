//! Delivery side of the consumer.
//!
//! - `MessageSender` - asynchronous hand-off used by the consumer loop
//! - `Delivery` - completion ticket carrying the message and its permit
//! - `DeliveryEndpoint` - one delivery attempt to the subscriber
//! - `ThreadedSender` - worker-pool sender with retries
//! - `LogEndpoint`, `FnEndpoint` - simple endpoints for tests and embedding

mod delivery;
mod endpoint;
mod threaded;

pub use delivery::{Delivery, DeliveryContext, DeliveryOutcome};
pub use endpoint::{DeliveryEndpoint, FnEndpoint, LogEndpoint};
pub use threaded::ThreadedSender;

use std::sync::Arc;

use crate::subscription::Subscription;

/// Asynchronous delivery of dispatched messages.
///
/// `send_message` must not block on the endpoint. Every `Delivery` it
/// receives must eventually be completed or dropped, including when the
/// sender is shut down, otherwise its permit is never returned and the
/// consumer stalls.
pub trait MessageSender: Send + Sync {
    fn send_message(&self, delivery: Delivery);

    fn update_subscription(&self, subscription: &Arc<Subscription>);

    /// Stop accepting new deliveries and let queued ones finish.
    fn shutdown(&self);
}
