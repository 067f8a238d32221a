//! Pull-based subscription consumer.
//!
//! A [`Consumer`] reads messages from a partitioned source, converts them for
//! the subscription's topic, and hands them to an asynchronous sender while
//! bounding inflight work and pacing dispatch. Offsets are tracked per
//! partition so only contiguously completed prefixes are ever committed.

mod config;
mod consumer;
mod converter;
mod error;
mod gate;
mod message;
mod metrics;
mod offset;
mod rate;
mod receiver;
mod sender;
mod subscription;
mod trackers;

pub use config::ConsumerConfig;
pub use consumer::{Consumer, ConsumerState, ConsumerThread, Iteration};
pub use converter::{
    Envelope, JsonEnvelopeConverter, MessageConverter, NoOperationConverter, CONTENT_TYPE_HEADER,
    TOPIC_HEADER,
};
pub use error::{CommitError, ConsumerError, ConvertError, DeliveryError, ReceiveError};
pub use gate::{InflightGate, InflightPermit};
pub use message::{Message, MessageMetadata, PartitionId, PartitionOffset};
pub use metrics::{ConsumerMetrics, MetricsSnapshot};
pub use offset::{
    CommitterStats, InMemoryOffsetStore, OffsetCommitTracker, OffsetCommitter, OffsetCommitterThread,
    OffsetSource, OffsetStore,
};
pub use rate::{FixedRateLimiter, RateLimiter, UnlimitedRateLimiter};
pub use receiver::{LogReceiver, MessageReceiver, PartitionedLog};
pub use sender::{
    Delivery, DeliveryContext, DeliveryEndpoint, DeliveryOutcome, FnEndpoint, LogEndpoint,
    MessageSender, ThreadedSender,
};
pub use subscription::{ContentType, RetryPolicy, Subscription, SubscriptionName, Topic};
#[cfg(feature = "emitter")]
pub use trackers::EmitterTracker;
pub use trackers::{LogTracker, MessageTracker, NoopTracker};

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
