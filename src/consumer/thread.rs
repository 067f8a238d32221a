//! Background thread running one consumer loop.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::Consumer;
use crate::converter::MessageConverter;
use crate::metrics::MetricsSnapshot;
use crate::rate::RateLimiter;
use crate::receiver::MessageReceiver;
use crate::sender::MessageSender;

/// A consumer running on its own named thread (`consumer-<subscription>`).
///
/// ## Example
///
/// ```ignore
/// let worker = ConsumerThread::spawn(Arc::clone(&consumer))?;
///
/// // ... consume ...
///
/// let metrics = worker.stop();
/// println!("dispatched {} messages", metrics.dispatched);
/// ```
pub struct ConsumerThread<R, C, S, L>
where
    R: MessageReceiver + 'static,
    C: MessageConverter + 'static,
    S: MessageSender + 'static,
    L: RateLimiter + 'static,
{
    consumer: Arc<Consumer<R, C, S, L>>,
    handle: Option<JoinHandle<()>>,
}

impl<R, C, S, L> ConsumerThread<R, C, S, L>
where
    R: MessageReceiver + 'static,
    C: MessageConverter + 'static,
    S: MessageSender + 'static,
    L: RateLimiter + 'static,
{
    pub fn spawn(consumer: Arc<Consumer<R, C, S, L>>) -> std::io::Result<Self> {
        let name = format!("consumer-{}", consumer.subscription().id());
        let handle = {
            let consumer = Arc::clone(&consumer);
            thread::Builder::new().name(name).spawn(move || consumer.run())?
        };

        Ok(Self {
            consumer,
            handle: Some(handle),
        })
    }

    pub fn consumer(&self) -> &Arc<Consumer<R, C, S, L>> {
        &self.consumer
    }

    /// Stop the consumer, wait for its loop to exit, and return its metrics.
    ///
    /// Deliveries already handed to the sender may still be finishing when
    /// this returns.
    pub fn stop(mut self) -> MetricsSnapshot {
        self.consumer.stop_consuming();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(
                    subscription = %self.consumer.subscription().id(),
                    "consumer thread panicked"
                );
            }
        }
        self.consumer.metrics().snapshot()
    }

    /// Signal the consumer to stop without waiting.
    pub fn signal_stop(&self) {
        self.consumer.stop_consuming();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl<R, C, S, L> Drop for ConsumerThread<R, C, S, L>
where
    R: MessageReceiver + 'static,
    C: MessageConverter + 'static,
    S: MessageSender + 'static,
    L: RateLimiter + 'static,
{
    fn drop(&mut self) {
        self.consumer.stop_consuming();
        // Don't join on drop - let the thread finish naturally
    }
}
