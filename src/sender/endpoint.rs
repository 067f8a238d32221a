use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::DeliveryError;
use crate::message::Message;
use crate::subscription::Subscription;

/// The subscriber-facing side of delivery: one attempt to hand a message to
/// the subscription's endpoint.
pub trait DeliveryEndpoint: Send + Sync {
    fn deliver(&self, subscription: &Subscription, message: &Message) -> Result<(), DeliveryError>;
}

/// An endpoint that logs deliveries to `tracing` or a buffer.
#[derive(Default, Clone)]
pub struct LogEndpoint {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl LogEndpoint {
    pub fn new() -> Self {
        LogEndpoint { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        LogEndpoint {
            buffer: Some(buffer),
        }
    }
}

impl DeliveryEndpoint for LogEndpoint {
    fn deliver(&self, subscription: &Subscription, message: &Message) -> Result<(), DeliveryError> {
        let payload = String::from_utf8_lossy(&message.payload);
        let line = format!(
            "[DELIVER] {} -> {} {}@{}/{} {}",
            subscription.id(),
            subscription.endpoint,
            message.id,
            message.partition,
            message.offset,
            payload
        );
        match &self.buffer {
            Some(buffer) => buffer
                .lock()
                .map_err(|_| DeliveryError::Retryable("log endpoint buffer poisoned".into()))?
                .push(line),
            None => tracing::info!(target: "consumer::delivery", "{}", line),
        }
        Ok(())
    }
}

/// An endpoint backed by a closure.
pub struct FnEndpoint<F> {
    deliver: F,
}

impl<F> FnEndpoint<F>
where
    F: Fn(&Subscription, &Message) -> Result<(), DeliveryError> + Send + Sync,
{
    pub fn new(deliver: F) -> Self {
        FnEndpoint { deliver }
    }
}

impl<F> DeliveryEndpoint for FnEndpoint<F>
where
    F: Fn(&Subscription, &Message) -> Result<(), DeliveryError> + Send + Sync,
{
    fn deliver(&self, subscription: &Subscription, message: &Message) -> Result<(), DeliveryError> {
        (self.deliver)(subscription, message)
    }
}

impl<F> fmt::Debug for FnEndpoint<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnEndpoint").finish_non_exhaustive()
    }
}
