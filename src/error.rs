use thiserror::Error;

/// Failure pulling the next message from the log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiveError {
    /// Nothing arrived within the receive timeout. Expected, retried at once.
    #[error("timed out waiting for a message")]
    Timeout,
    /// The receiver was stopped and will not produce more messages.
    #[error("receiver stopped")]
    Stopped,
    #[error("receive failed: {0}")]
    Failed(String),
}

/// Failure transforming a raw message into its delivery form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("payload decode failed: {0}")]
    Decode(String),
    #[error("payload encode failed: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for ConvertError {
    fn from(err: serde_json::Error) -> Self {
        ConvertError::Encode(err.to_string())
    }
}

/// Outcome of a single delivery attempt that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Transient failure; the sender may try again.
    #[error("delivery failed, retryable: {0}")]
    Retryable(String),
    /// The endpoint refused the message; retrying will not help.
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Retryable(_))
    }
}

/// Failure persisting commit offsets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error("offset store error: {0}")]
    Store(String),
    #[error("offset store lock poisoned")]
    LockPoisoned,
}

/// Error raised by one iteration of the consumption loop.
///
/// None of these end the loop; they are logged against the subscription and
/// the loop moves on to its next iteration.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error(transparent)]
    Receive(#[from] ReceiveError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error("lock poisoned during {0}")]
    LockPoisoned(&'static str),
}
