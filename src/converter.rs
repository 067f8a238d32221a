//! Conversion of raw log messages into their delivery form.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ConvertError;
use crate::message::Message;
use crate::subscription::{ContentType, Topic};

pub const TOPIC_HEADER: &str = "topic";
pub const CONTENT_TYPE_HEADER: &str = "content-type";

/// Transforms a received message into what the sender delivers.
///
/// Conversion is pure in-process work; it never blocks on I/O.
pub trait MessageConverter: Send + Sync {
    fn convert(&self, message: Message, topic: &Topic) -> Result<Message, ConvertError>;
}

/// Passes the payload through untouched and stamps topic headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOperationConverter;

impl MessageConverter for NoOperationConverter {
    fn convert(&self, mut message: Message, topic: &Topic) -> Result<Message, ConvertError> {
        message.set_metadata(TOPIC_HEADER, &topic.name);
        message.set_metadata(CONTENT_TYPE_HEADER, topic.content_type.as_mime());
        Ok(message)
    }
}

/// Envelope produced by `JsonEnvelopeConverter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub timestamp: u64,
    pub metadata: BTreeMap<String, String>,
    /// Encoding of the topic the payload came from.
    #[serde(default)]
    pub content_type: ContentType,
    /// Original payload; JSON topics embed it as a JSON value, binary topics
    /// as a base64 string.
    pub message: serde_json::Value,
}

/// Wraps the payload and its metadata into a JSON `Envelope`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEnvelopeConverter;

impl JsonEnvelopeConverter {
    fn body(message: &Message, content_type: ContentType) -> Result<serde_json::Value, ConvertError> {
        match content_type {
            ContentType::Json => serde_json::from_slice(&message.payload)
                .map_err(|err| ConvertError::Decode(err.to_string())),
            ContentType::Binary => Ok(serde_json::Value::String(STANDARD.encode(&message.payload))),
        }
    }
}

impl MessageConverter for JsonEnvelopeConverter {
    fn convert(&self, mut message: Message, topic: &Topic) -> Result<Message, ConvertError> {
        let envelope = Envelope {
            id: message.id.clone(),
            topic: topic.name.clone(),
            partition: message.partition.0,
            offset: message.offset,
            timestamp: message.publish_timestamp,
            metadata: message.metadata.iter().cloned().collect(),
            content_type: topic.content_type,
            message: Self::body(&message, topic.content_type)?,
        };
        message.payload = serde_json::to_vec(&envelope)?;
        message.set_metadata(TOPIC_HEADER, &topic.name);
        message.set_metadata(CONTENT_TYPE_HEADER, ContentType::Json.as_mime());
        Ok(message)
    }
}

impl Envelope {
    /// Recover the original payload bytes from an envelope.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, ConvertError> {
        match (self.content_type, &self.message) {
            (ContentType::Binary, serde_json::Value::String(encoded)) => STANDARD
                .decode(encoded)
                .map_err(|err| ConvertError::Decode(err.to_string())),
            (ContentType::Binary, _) => Err(ConvertError::Decode(
                "binary envelope payload is not a base64 string".into(),
            )),
            (ContentType::Json, value) => Ok(serde_json::to_vec(value)?),
        }
    }
}
