//! Per-message audit hooks.
//!
//! The consumer reports every message it dispatches, and the sender reports
//! how each delivery ended. Where those reports go is up to the tracker.

use crate::message::MessageMetadata;

pub trait MessageTracker: Send + Sync {
    /// The message was handed to the sender.
    fn log_inflight(&self, message: &MessageMetadata);

    /// The endpoint accepted the message.
    fn log_sent(&self, message: &MessageMetadata);

    /// Delivery gave up on the message; its offset is committed anyway.
    fn log_discarded(&self, message: &MessageMetadata, reason: &str);

    /// Delivery never finished (for example the sender shut down first); the
    /// offset stays uncommitted and the message will be redelivered.
    fn log_abandoned(&self, _message: &MessageMetadata) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracker;

impl MessageTracker for NoopTracker {
    fn log_inflight(&self, _message: &MessageMetadata) {}

    fn log_sent(&self, _message: &MessageMetadata) {}

    fn log_discarded(&self, _message: &MessageMetadata, _reason: &str) {}
}

/// Writes tracker events to `tracing` under the `consumer::trackers` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTracker;

impl MessageTracker for LogTracker {
    fn log_inflight(&self, m: &MessageMetadata) {
        tracing::trace!(
            target: "consumer::trackers",
            subscription = %m.subscription,
            message_id = %m.message_id,
            partition = %m.partition,
            offset = m.offset,
            "inflight"
        );
    }

    fn log_sent(&self, m: &MessageMetadata) {
        tracing::debug!(
            target: "consumer::trackers",
            subscription = %m.subscription,
            message_id = %m.message_id,
            partition = %m.partition,
            offset = m.offset,
            "sent"
        );
    }

    fn log_discarded(&self, m: &MessageMetadata, reason: &str) {
        tracing::warn!(
            target: "consumer::trackers",
            subscription = %m.subscription,
            message_id = %m.message_id,
            partition = %m.partition,
            offset = m.offset,
            reason,
            "discarded"
        );
    }

    fn log_abandoned(&self, m: &MessageMetadata) {
        tracing::warn!(
            target: "consumer::trackers",
            subscription = %m.subscription,
            message_id = %m.message_id,
            partition = %m.partition,
            offset = m.offset,
            "abandoned before delivery completed"
        );
    }
}

/// Emits tracker events on an in-process `EventEmitter`.
///
/// Event names are `message.inflight`, `message.sent`, `message.discarded`
/// and `message.abandoned`; the value is the serialized `MessageMetadata`.
#[cfg(feature = "emitter")]
pub struct EmitterTracker {
    emitter: std::sync::Mutex<crate::EventEmitter>,
}

#[cfg(feature = "emitter")]
impl EmitterTracker {
    pub const INFLIGHT: &'static str = "message.inflight";
    pub const SENT: &'static str = "message.sent";
    pub const DISCARDED: &'static str = "message.discarded";
    pub const ABANDONED: &'static str = "message.abandoned";

    pub fn new(emitter: crate::EventEmitter) -> Self {
        EmitterTracker {
            emitter: std::sync::Mutex::new(emitter),
        }
    }

    fn emit(&self, event: &str, message: &MessageMetadata) {
        match self.emitter.lock() {
            Ok(mut emitter) => {
                emitter.emit(event, message.clone());
            }
            Err(_) => tracing::error!(event, "tracker emitter lock poisoned"),
        }
    }
}

#[cfg(feature = "emitter")]
impl MessageTracker for EmitterTracker {
    fn log_inflight(&self, message: &MessageMetadata) {
        self.emit(Self::INFLIGHT, message);
    }

    fn log_sent(&self, message: &MessageMetadata) {
        self.emit(Self::SENT, message);
    }

    fn log_discarded(&self, message: &MessageMetadata, _reason: &str) {
        self.emit(Self::DISCARDED, message);
    }

    fn log_abandoned(&self, message: &MessageMetadata) {
        self.emit(Self::ABANDONED, message);
    }
}
