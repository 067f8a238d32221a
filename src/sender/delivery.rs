//! Completion tickets for dispatched messages.
//!
//! A `Delivery` owns the message, its inflight permit, and the handles needed
//! to report how delivery ended. However the ticket is consumed, the permit is
//! released exactly once:
//!
//! - `complete(Delivered)` / `complete(Discarded)` acknowledge the offset in
//!   the tracker, then release the permit
//! - dropping the ticket without completing it releases the permit but leaves
//!   the offset unacknowledged, so it is redelivered after a restart

use std::fmt;
use std::sync::Arc;

use crate::error::ConsumerError;
use crate::gate::InflightPermit;
use crate::message::{Message, MessageMetadata, PartitionOffset};
use crate::metrics::ConsumerMetrics;
use crate::offset::OffsetCommitTracker;
use crate::trackers::MessageTracker;

/// How a delivery finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The endpoint accepted the message.
    Delivered,
    /// Delivery gave up; the message is dropped and its offset committed.
    Discarded(String),
}

/// Shared handles a consumer passes along with every dispatched message.
#[derive(Clone)]
pub struct DeliveryContext {
    offsets: Arc<OffsetCommitTracker>,
    trackers: Arc<dyn MessageTracker>,
    metrics: Arc<ConsumerMetrics>,
}

impl DeliveryContext {
    pub fn new(
        offsets: Arc<OffsetCommitTracker>,
        trackers: Arc<dyn MessageTracker>,
        metrics: Arc<ConsumerMetrics>,
    ) -> Self {
        Self {
            offsets,
            trackers,
            metrics,
        }
    }

    pub fn offsets(&self) -> &Arc<OffsetCommitTracker> {
        &self.offsets
    }

    pub fn metrics(&self) -> &Arc<ConsumerMetrics> {
        &self.metrics
    }

    pub fn trackers(&self) -> &Arc<dyn MessageTracker> {
        &self.trackers
    }

    /// Record `message` as pending and wrap it in a ticket for the sender.
    pub fn dispatch(
        &self,
        message: Message,
        subscription_id: &str,
        permit: InflightPermit,
    ) -> Result<Delivery, ConsumerError> {
        self.offsets.record_dispatched(message.partition, message.offset)?;
        let metadata = MessageMetadata::from_message(&message, subscription_id);
        self.metrics.message_dispatched();
        self.trackers.log_inflight(&metadata);
        Ok(Delivery {
            message,
            completion: Some(Completion {
                permit,
                metadata,
                context: self.clone(),
            }),
        })
    }
}

impl fmt::Debug for DeliveryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryContext")
            .field("offsets", &self.offsets)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

struct Completion {
    permit: InflightPermit,
    metadata: MessageMetadata,
    context: DeliveryContext,
}

impl Completion {
    fn finish(self, outcome: DeliveryOutcome) {
        let Completion {
            permit,
            metadata,
            context,
        } = self;

        if let Err(err) = context
            .offsets
            .record_acknowledged(metadata.partition, metadata.offset)
        {
            tracing::error!(
                subscription = %metadata.subscription,
                partition = %metadata.partition,
                offset = metadata.offset,
                error = %err,
                "failed to acknowledge offset"
            );
        }

        match &outcome {
            DeliveryOutcome::Delivered => {
                context.metrics.message_delivered();
                context.trackers.log_sent(&metadata);
            }
            DeliveryOutcome::Discarded(reason) => {
                context.metrics.message_discarded();
                context.trackers.log_discarded(&metadata, reason);
            }
        }

        permit.release();
    }

    fn abandon(self) {
        self.context.metrics.message_abandoned();
        self.context.trackers.log_abandoned(&self.metadata);
    }
}

/// A dispatched message awaiting its delivery outcome.
#[must_use = "dropping a delivery abandons it without acknowledging its offset"]
pub struct Delivery {
    message: Message,
    completion: Option<Completion>,
}

impl Delivery {
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn partition_offset(&self) -> PartitionOffset {
        self.message.partition_offset()
    }

    /// Report the final outcome: acknowledge the offset and free the permit.
    pub fn complete(mut self, outcome: DeliveryOutcome) {
        if let Some(completion) = self.completion.take() {
            completion.finish(outcome);
        }
    }

    /// Give the message up without acknowledging it. Same as dropping.
    pub fn abandon(self) {}
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            completion.abandon();
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("partition", &self.message.partition)
            .field("offset", &self.message.offset)
            .field("completed", &self.completion.is_none())
            .finish()
    }
}
