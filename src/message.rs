//! Messages flowing through a consumer and the offsets they originate from.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a partition within a topic's log.
///
/// Offsets are only comparable within the same partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(pub u32);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PartitionId {
    fn from(value: u32) -> Self {
        PartitionId(value)
    }
}

/// A commit checkpoint: the highest offset on `partition` whose predecessors
/// have all been delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionOffset {
    pub partition: PartitionId,
    pub offset: u64,
}

impl PartitionOffset {
    pub fn new(partition: impl Into<PartitionId>, offset: u64) -> Self {
        Self {
            partition: partition.into(),
            offset,
        }
    }

    /// Position a reader resumes from after this checkpoint has been persisted.
    pub fn next_read_offset(&self) -> u64 {
        self.offset + 1
    }
}

/// A unit of work pulled from the log.
///
/// Created by a receiver, rewritten once by a converter, and immutable after
/// that until its delivery completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Unique identifier for this message
    pub id: String,
    /// Partition the message was read from
    pub partition: PartitionId,
    /// Offset within `partition`
    pub offset: u64,
    /// Payload bytes (raw topic bytes, or an envelope produced by a converter)
    pub payload: Vec<u8>,
    /// Publish time in milliseconds since the epoch
    pub publish_timestamp: u64,
    /// Headers added by the publisher or by conversion
    pub metadata: Vec<(String, String)>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        partition: impl Into<PartitionId>,
        offset: u64,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            partition: partition.into(),
            offset,
            payload,
            publish_timestamp: 0,
            metadata: Vec::new(),
        }
    }

    pub fn with_string_payload(
        id: impl Into<String>,
        partition: impl Into<PartitionId>,
        offset: u64,
        payload: impl Into<String>,
    ) -> Self {
        Self::new(id, partition, offset, payload.into().into_bytes())
    }

    pub fn with_publish_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.publish_timestamp = timestamp_ms;
        self
    }

    /// Add a metadata entry, replacing an existing one with the same key.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_metadata(key, value);
        self
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.metadata.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.metadata.push((key, value)),
        }
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn partition_offset(&self) -> PartitionOffset {
        PartitionOffset {
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// The slice of a message that trackers and logs see.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub message_id: String,
    pub subscription: String,
    pub partition: PartitionId,
    pub offset: u64,
    pub publish_timestamp: u64,
}

impl MessageMetadata {
    pub fn from_message(message: &Message, subscription: &str) -> Self {
        Self {
            message_id: message.id.clone(),
            subscription: subscription.to_string(),
            partition: message.partition,
            offset: message.offset,
            publish_timestamp: message.publish_timestamp,
        }
    }
}
