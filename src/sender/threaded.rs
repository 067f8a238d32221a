//! Delivery on a pool of background threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwap;

use super::{Delivery, DeliveryEndpoint, DeliveryOutcome, MessageSender};
use crate::subscription::Subscription;

struct SenderShared<E> {
    endpoint: E,
    subscription: ArcSwap<Subscription>,
    stopping: AtomicBool,
}

impl<E: DeliveryEndpoint> SenderShared<E> {
    /// Attempt delivery under the subscription's retry policy.
    ///
    /// Once the sender is shutting down no further retries are made; a
    /// delivery that has not succeeded by then is abandoned so its offset is
    /// not committed.
    fn deliver(&self, delivery: Delivery) {
        let subscription = self.subscription.load_full();
        let max_attempts = subscription.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.endpoint.deliver(&subscription, delivery.message()) {
                Ok(()) => {
                    delivery.complete(DeliveryOutcome::Delivered);
                    return;
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    tracing::debug!(
                        subscription = %subscription.id(),
                        attempt,
                        error = %err,
                        "delivery attempt failed, retrying"
                    );
                    if self.stopping.load(Ordering::Acquire) {
                        break;
                    }
                    thread::sleep(subscription.retry.backoff);
                    if self.stopping.load(Ordering::Acquire) {
                        break;
                    }
                }
                Err(err) => {
                    delivery.complete(DeliveryOutcome::Discarded(err.to_string()));
                    return;
                }
            }
        }

        tracing::warn!(
            subscription = %subscription.id(),
            offset = delivery.message().offset,
            "sender shutting down, abandoning delivery"
        );
        delivery.abandon();
    }
}

/// A `MessageSender` that delivers on a fixed pool of worker threads.
///
/// `send_message` only enqueues, so the consumer loop never waits on the
/// endpoint. `shutdown` stops accepting work; whatever is already queued is
/// still attempted once, and `join` waits for the workers to finish.
///
/// ## Example
///
/// ```ignore
/// let sender = ThreadedSender::new(LogEndpoint::new(), Arc::new(subscription), 4)?;
/// // ... hand the sender to a Consumer ...
/// sender.shutdown();
/// sender.join();
/// ```
pub struct ThreadedSender<E: DeliveryEndpoint + 'static> {
    queue: Mutex<Option<Sender<Delivery>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<SenderShared<E>>,
}

impl<E: DeliveryEndpoint + 'static> ThreadedSender<E> {
    pub fn new(endpoint: E, subscription: Arc<Subscription>, threads: usize) -> std::io::Result<Self> {
        let (tx, rx) = channel();
        let rx = Arc::new(Mutex::new(rx));
        let name = subscription.id();
        let shared = Arc::new(SenderShared {
            endpoint,
            subscription: ArcSwap::new(subscription),
            stopping: AtomicBool::new(false),
        });

        let mut workers = Vec::with_capacity(threads.max(1));
        for index in 0..threads.max(1) {
            let rx = Arc::clone(&rx);
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("sender-{name}-{index}"))
                .spawn(move || worker_loop(&rx, &shared))?;
            workers.push(handle);
        }

        Ok(Self {
            queue: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            shared,
        })
    }

    pub fn endpoint(&self) -> &E {
        &self.shared.endpoint
    }

    pub fn subscription(&self) -> Arc<Subscription> {
        self.shared.subscription.load_full()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.stopping.load(Ordering::Acquire)
    }

    /// Wait for every worker to drain the queue and exit. Only returns once
    /// `shutdown` has been called.
    pub fn join(&self) {
        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(_) => return,
        };
        for worker in workers {
            let _ = worker.join();
        }
    }
}

fn worker_loop<E: DeliveryEndpoint>(rx: &Mutex<Receiver<Delivery>>, shared: &SenderShared<E>) {
    loop {
        let next = match rx.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => break,
        };
        match next {
            Ok(delivery) => shared.deliver(delivery),
            Err(_) => break,
        }
    }
}

impl<E: DeliveryEndpoint + 'static> MessageSender for ThreadedSender<E> {
    fn send_message(&self, delivery: Delivery) {
        let queue = match self.queue.lock() {
            Ok(queue) => queue,
            Err(_) => {
                tracing::error!("sender queue lock poisoned, abandoning delivery");
                return;
            }
        };
        match queue.as_ref() {
            Some(tx) => {
                if let Err(rejected) = tx.send(delivery) {
                    tracing::warn!("sender workers gone, abandoning delivery");
                    drop(rejected.0);
                }
            }
            None => {
                tracing::warn!(
                    offset = delivery.message().offset,
                    "sender already shut down, abandoning delivery"
                );
            }
        }
    }

    fn update_subscription(&self, subscription: &Arc<Subscription>) {
        self.shared.subscription.store(Arc::clone(subscription));
    }

    fn shutdown(&self) {
        self.shared.stopping.store(true, Ordering::Release);
        if let Ok(mut queue) = self.queue.lock() {
            queue.take();
        }
    }
}

impl<E: DeliveryEndpoint + 'static> Drop for ThreadedSender<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
