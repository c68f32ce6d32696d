use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{MessageType, WS_MAX_MESSAGE_SIZE};

/// Errors from decoding a single inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame too large ({0} bytes)")]
    TooLarge(usize),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Envelope for every frame on the event stream.
///
/// `timestamp` defaults to the local receive time when the server omits it,
/// and `seq` is only present on streams that number their events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(default)]
    pub payload: Value,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl Message {
    /// Creates a new message stamped with the current time.
    pub fn new<T: Serialize>(msg_type: MessageType, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            msg_type,
            payload: serde_json::to_value(payload)?,
            timestamp: Utc::now(),
            seq: None,
        })
    }

    /// Creates a message without a payload.
    pub fn empty(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            payload: Value::Null,
            timestamp: Utc::now(),
            seq: None,
        }
    }

    /// Decodes a text frame, rejecting oversized input before parsing.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        if text.len() > WS_MAX_MESSAGE_SIZE {
            return Err(FrameError::TooLarge(text.len()));
        }
        Ok(serde_json::from_str(text)?)
    }

    /// Encodes the message as a JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Looks up a payload attribute by dot-separated path
    /// (e.g. `"submission.id"`).
    pub fn field(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.payload, |value, segment| value.get(segment))
    }

    /// Deserializes the payload into the given type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}
