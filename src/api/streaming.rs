//! Streaming Types
//!
//! Event records decoded from a streamed chat completion, and an accumulator
//! that folds them back into a complete message.

use crate::api::completion::{Message, Role, Usage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One decoded `data: {...}` event from the stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Chunk ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Object type (`chat.completion.chunk`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,

    /// Creation timestamp (unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,

    /// Model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Choices with deltas
    #[serde(default)]
    pub choices: Vec<StreamChoice>,

    /// Usage info (only in final chunk for some providers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Error reported inside the stream
    #[serde(
        default,
        deserialize_with = "deserialize_error",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<ErrorObject>,

    /// Fields this crate does not model
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EventRecord {
    /// The first choice, which drives dispatch
    pub fn first_choice(&self) -> Option<&StreamChoice> {
        self.choices.first()
    }

    /// Content delta of the first choice, if the chunk carries one
    pub fn content(&self) -> Option<&str> {
        self.first_choice()
            .and_then(|c| c.delta.content.as_deref())
    }

    /// Non-empty finish reason of the first choice
    pub fn finish_reason(&self) -> Option<&str> {
        self.first_choice()
            .and_then(|c| c.finish_reason.as_deref())
            .filter(|reason| !reason.is_empty())
    }

    /// Creation time as a UTC timestamp
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// A choice in a streaming chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChoice {
    /// Choice index
    #[serde(default)]
    pub index: u32,

    /// The delta (partial message)
    #[serde(default)]
    pub delta: StreamDelta,

    /// Finish reason (set in final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Delta content in a streaming chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamDelta {
    /// Role (usually only in first chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Content delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Error payload returned by the API, either as a response body
/// (`{"error": {...}}`) or inside a stream event.
///
/// Only the common fields are typed; anything else lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<serde_json::Value>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ErrorObject {
    /// Build from the raw value of an `error` field.
    ///
    /// Some gateways send a bare string instead of an object; that string
    /// becomes the message.
    pub fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(message) => Self {
                message: Some(message),
                ..Default::default()
            },
            other => serde_json::from_value(other.clone()).unwrap_or_else(|_| {
                let mut extra = serde_json::Map::new();
                extra.insert("error".to_string(), other);
                Self {
                    extra,
                    ..Default::default()
                }
            }),
        }
    }
}

fn deserialize_error<'de, D>(deserializer: D) -> Result<Option<ErrorObject>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.map(ErrorObject::from_value))
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.message, &self.kind) {
            (Some(message), _) => write!(f, "{}", message),
            (None, Some(kind)) => write!(f, "{}", kind),
            (None, None) => {
                let raw = serde_json::to_string(self).unwrap_or_default();
                write!(f, "{}", raw)
            }
        }
    }
}

/// Accumulator for streaming chunks
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    /// Accumulated content
    pub content: String,

    /// Role from first chunk
    pub role: Option<String>,

    /// Finish reason from last chunk
    pub finish_reason: Option<String>,

    /// Response ID
    pub id: Option<String>,

    /// Model name
    pub model: Option<String>,

    /// Usage from final chunk
    pub usage: Option<Usage>,
}

impl StreamAccumulator {
    /// Create a new accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event record into the accumulated message
    pub fn push(&mut self, record: &EventRecord) {
        if self.id.is_none() {
            self.id = record.id.clone();
            self.model = record.model.clone();
        }

        if record.usage.is_some() {
            self.usage = record.usage.clone();
        }

        if let Some(choice) = record.first_choice() {
            if self.role.is_none() {
                self.role = choice.delta.role.clone();
            }
            if let Some(content) = &choice.delta.content {
                self.content.push_str(content);
            }
            if let Some(reason) = record.finish_reason() {
                self.finish_reason = Some(reason.to_string());
            }
        }
    }

    /// Convert to a final Message
    pub fn into_message(self) -> Message {
        Message {
            role: self
                .role
                .and_then(|role| role.parse().ok())
                .unwrap_or(Role::Assistant),
            content: self.content,
            name: None,
        }
    }
}
