//! Chat wire format.
//!
//! Every frame in either direction is a JSON object with four string fields:
//!
//! ```json
//! {"type":"chat","sender_name":"alice","content":"hi","created_at":"2024-01-01T00:00:00Z"}
//! ```
//!
//! The hub decodes only far enough to reject malformed frames, then
//! re-encodes the message in this canonical field order. Field values are
//! never rewritten. Missing or `null` fields decode as empty strings, a bare
//! `null` frame decodes as an all-empty message, and unknown fields are
//! dropped.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One chat message as it travels over the socket.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatMessage {
    /// Message kind, `"chat"` for ordinary messages.
    #[serde(rename = "type", deserialize_with = "null_as_empty")]
    pub kind: String,
    /// Display name of the author.
    #[serde(deserialize_with = "null_as_empty")]
    pub sender_name: String,
    /// Opaque message body.
    #[serde(deserialize_with = "null_as_empty")]
    pub content: String,
    /// Client-supplied timestamp string.
    #[serde(deserialize_with = "null_as_empty")]
    pub created_at: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A frame that could not be decoded as a [`ChatMessage`].
#[derive(Debug, thiserror::Error)]
#[error("malformed chat frame: {0}")]
pub struct FrameError(#[from] serde_json::Error);

impl ChatMessage {
    /// Build a `"chat"` message stamped with the current UTC time.
    pub fn chat(sender_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: "chat".into(),
            sender_name: sender_name.into(),
            content: content.into(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Decode one frame body. Text and binary frames share this path.
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        let msg: Option<Self> = serde_json::from_slice(frame)?;
        Ok(msg.unwrap_or_default())
    }

    /// Encode in canonical form.
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }
}
