//! Pull side of the consumer: where messages come from.

mod partitioned_log;

pub use partitioned_log::{LogReceiver, PartitionedLog};

use crate::error::ReceiveError;
use crate::message::Message;

/// Blocking pull source of messages from the log.
///
/// `next` blocks for a bounded time. Running out of time is reported as
/// `ReceiveError::Timeout`, which the consumer treats as a normal retry.
pub trait MessageReceiver: Send + Sync {
    /// Pull the next message, blocking until one is available, the receive
    /// timeout elapses, or the receiver is stopped.
    fn next(&self) -> Result<Message, ReceiveError>;

    /// Release any blocked pull and close the source. Later calls to `next`
    /// return `ReceiveError::Stopped`.
    fn stop(&self);
}
