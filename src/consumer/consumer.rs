use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use arc_swap::ArcSwap;

use crate::config::ConsumerConfig;
use crate::converter::MessageConverter;
use crate::error::{ConsumerError, ReceiveError};
use crate::gate::InflightGate;
use crate::message::{Message, PartitionOffset};
use crate::metrics::ConsumerMetrics;
use crate::offset::{OffsetCommitTracker, OffsetSource};
use crate::rate::RateLimiter;
use crate::receiver::MessageReceiver;
use crate::sender::{DeliveryContext, DeliveryOutcome, MessageSender};
use crate::subscription::Subscription;
use crate::trackers::{LogTracker, MessageTracker};

/// Lifecycle of a consumer: `Running → Stopping → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConsumerState {
    Running = 0,
    /// Stop was requested; the loop has not noticed yet or is winding down.
    Stopping = 1,
    /// The loop exited and the receiver was stopped.
    Stopped = 2,
}

impl ConsumerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConsumerState::Running,
            1 => ConsumerState::Stopping,
            _ => ConsumerState::Stopped,
        }
    }
}

/// What a single loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// A message was handed to the sender.
    Dispatched,
    /// The receive timed out; the permit was returned.
    ReceiveTimeout,
    /// No work was attempted (no permit in time, pacing refused, or the
    /// receiver is closed).
    Idle,
}

/// The consumption loop of one subscription.
///
/// Each iteration acquires an inflight permit, passes the rate limiter, pulls
/// one message, converts it, records it as pending and hands it to the
/// sender. The permit travels with the message and comes back when delivery
/// completes.
///
/// A consumer is shared (`Arc`) between the thread running [`Consumer::run`]
/// and whoever controls it through `stop_consuming`, `update_subscription`
/// and `offsets_to_commit`.
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use sourced_consumer::{
///     Consumer, ConsumerConfig, ConsumerThread, LogEndpoint, NoOperationConverter,
///     PartitionId, PartitionedLog, Subscription, ThreadedSender, Topic, UnlimitedRateLimiter,
/// };
///
/// let log = PartitionedLog::new(1);
/// log.append_str(PartitionId(0), "m-1", r#"{"id":1}"#);
///
/// let config = ConsumerConfig::new().with_receive_timeout(Duration::from_millis(20));
/// let subscription = Arc::new(Subscription::new(Topic::new("orders"), "billing", "log://"));
/// let sender = ThreadedSender::new(LogEndpoint::new(), Arc::clone(&subscription), 1).unwrap();
///
/// let consumer = Arc::new(
///     Consumer::new(
///         subscription,
///         log.receiver(config.receive_timeout),
///         NoOperationConverter,
///         sender,
///         UnlimitedRateLimiter,
///     )
///     .with_config(config),
/// );
///
/// let worker = ConsumerThread::spawn(Arc::clone(&consumer)).unwrap();
/// std::thread::sleep(Duration::from_millis(100));
/// let metrics = worker.stop();
/// assert_eq!(metrics.dispatched, 1);
/// ```
pub struct Consumer<R, C, S, L> {
    subscription: ArcSwap<Subscription>,
    receiver: R,
    converter: C,
    sender: S,
    rate_limiter: L,
    gate: Arc<InflightGate>,
    context: DeliveryContext,
    config: ConsumerConfig,
    state: AtomicU8,
    // Held while dispatching and while swapping subscriptions, so a dispatch
    // never sees the limiter and sender configured from different snapshots.
    update_lock: Mutex<()>,
}

impl<R, C, S, L> Consumer<R, C, S, L>
where
    R: MessageReceiver,
    C: MessageConverter,
    S: MessageSender,
    L: RateLimiter,
{
    pub fn new(
        subscription: Arc<Subscription>,
        receiver: R,
        converter: C,
        sender: S,
        rate_limiter: L,
    ) -> Self {
        let gate = InflightGate::new(subscription.max_inflight);
        Self {
            subscription: ArcSwap::new(subscription),
            receiver,
            converter,
            sender,
            rate_limiter,
            gate,
            context: DeliveryContext::new(
                Arc::new(OffsetCommitTracker::new()),
                Arc::new(LogTracker),
                Arc::new(ConsumerMetrics::new()),
            ),
            config: ConsumerConfig::default(),
            state: AtomicU8::new(ConsumerState::Running as u8),
            update_lock: Mutex::new(()),
        }
    }

    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn MessageTracker>) -> Self {
        self.context = DeliveryContext::new(
            Arc::clone(self.context.offsets()),
            tracker,
            Arc::clone(self.context.metrics()),
        );
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ConsumerMetrics>) -> Self {
        self.context = DeliveryContext::new(
            Arc::clone(self.context.offsets()),
            Arc::clone(self.context.trackers()),
            metrics,
        );
        self
    }

    /// Share an existing tracker, e.g. one that outlives consumer restarts
    /// within the same process.
    pub fn with_offset_tracker(mut self, offsets: Arc<OffsetCommitTracker>) -> Self {
        self.context = DeliveryContext::new(
            offsets,
            Arc::clone(self.context.trackers()),
            Arc::clone(self.context.metrics()),
        );
        self
    }

    fn id(&self) -> String {
        self.subscription.load().id()
    }

    /// Run the loop on the calling thread until `stop_consuming` is called.
    pub fn run(&self) {
        if self.state() == ConsumerState::Running {
            self.rate_limiter.initialize();
            tracing::info!(subscription = %self.id(), "consumer started");
        }

        while self.is_consuming() {
            if let Err(err) = self.run_once() {
                self.context.metrics().loop_error();
                tracing::error!(subscription = %self.id(), error = %err, "consumer loop failed");
            }
        }

        tracing::info!(subscription = %self.id(), "stopping consumer");
        self.receiver.stop();
        self.state.store(ConsumerState::Stopped as u8, Ordering::Release);
    }

    /// Perform one iteration of the loop.
    ///
    /// Every path that does not hand a message to the sender returns its
    /// permit before returning.
    pub fn run_once(&self) -> Result<Iteration, ConsumerError> {
        let Some(permit) = self.gate.acquire_timeout(self.config.admission_wait) else {
            return Ok(Iteration::Idle);
        };

        if !self.rate_limiter.acquire() {
            return Ok(Iteration::Idle);
        }

        let message = match self.receiver.next() {
            Ok(message) => message,
            Err(ReceiveError::Timeout) => {
                self.context.metrics().receive_timeout();
                tracing::debug!(subscription = %self.id(), "timeout while reading message, trying again");
                return Ok(Iteration::ReceiveTimeout);
            }
            Err(ReceiveError::Stopped) => {
                drop(permit);
                if self.is_consuming() {
                    thread::sleep(self.config.admission_wait);
                }
                return Ok(Iteration::Idle);
            }
            Err(err) => return Err(err.into()),
        };

        let _update = self
            .update_lock
            .lock()
            .map_err(|_| ConsumerError::LockPoisoned("subscription update"))?;
        let subscription = self.subscription.load_full();
        let id = subscription.id();

        let origin = Message::new(message.id.clone(), message.partition, message.offset, Vec::new())
            .with_publish_timestamp(message.publish_timestamp);

        match self.converter.convert(message, &subscription.topic) {
            Ok(converted) => {
                let delivery = self.context.dispatch(converted, &id, permit)?;
                self.sender.send_message(delivery);
                Ok(Iteration::Dispatched)
            }
            Err(err) => {
                // The message can never be delivered; commit past it so the
                // partition does not stall behind it.
                let delivery = self.context.dispatch(origin, &id, permit)?;
                delivery.complete(DeliveryOutcome::Discarded(err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Ask the loop to stop. Shuts the rate limiter and the sender down;
    /// the loop stops the receiver itself once it notices. Dispatched
    /// messages keep their tracker state so a final commit can be taken.
    pub fn stop_consuming(&self) {
        if self
            .state
            .compare_exchange(
                ConsumerState::Running as u8,
                ConsumerState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }
        tracing::info!(subscription = %self.id(), "stop requested");
        self.rate_limiter.shutdown();
        self.sender.shutdown();
    }

    /// Replace the subscription snapshot. The rate limiter and the sender
    /// are updated first; no dispatch observes a partial update.
    pub fn update_subscription(&self, subscription: Arc<Subscription>) {
        let _update = match self.update_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.rate_limiter.update_subscription(&subscription);
        self.sender.update_subscription(&subscription);
        self.gate.set_capacity(subscription.max_inflight);
        tracing::info!(subscription = %subscription.id(), "subscription updated");
        self.subscription.store(subscription);
    }

    pub fn subscription(&self) -> Arc<Subscription> {
        self.subscription.load_full()
    }

    /// Offsets that became safe to commit since the last call.
    pub fn offsets_to_commit(&self) -> Vec<PartitionOffset> {
        match self.context.offsets().offsets_to_commit() {
            Ok(offsets) => offsets,
            Err(err) => {
                tracing::error!(subscription = %self.id(), error = %err, "reading offsets to commit failed");
                Vec::new()
            }
        }
    }

    pub fn state(&self) -> ConsumerState {
        ConsumerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_consuming(&self) -> bool {
        self.state() == ConsumerState::Running
    }

    pub fn offset_tracker(&self) -> &Arc<OffsetCommitTracker> {
        self.context.offsets()
    }

    pub fn metrics(&self) -> &Arc<ConsumerMetrics> {
        self.context.metrics()
    }

    pub fn gate(&self) -> &Arc<InflightGate> {
        &self.gate
    }

    pub fn receiver(&self) -> &R {
        &self.receiver
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    pub fn rate_limiter(&self) -> &L {
        &self.rate_limiter
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }
}

impl<R, C, S, L> OffsetSource for Consumer<R, C, S, L>
where
    R: MessageReceiver,
    C: MessageConverter,
    S: MessageSender,
    L: RateLimiter,
{
    fn subscription_id(&self) -> String {
        self.id()
    }

    fn offsets_to_commit(&self) -> Vec<PartitionOffset> {
        Consumer::offsets_to_commit(self)
    }
}

impl<R, C, S, L> fmt::Debug for Consumer<R, C, S, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("subscription", &self.subscription.load().id())
            .field("state", &ConsumerState::from_u8(self.state.load(Ordering::Acquire)))
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}
