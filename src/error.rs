//! GPTChat Error Types
//!
//! Errors for the request/response path (`GptError`) and for the streaming
//! pipeline (`StreamError`).

use crate::api::streaming::ErrorObject;
use thiserror::Error;

/// Main error type for client operations
#[derive(Debug, Error)]
pub enum GptError {
    /// Configuration errors (invalid JSON, unreadable file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No usable API key
    #[error("Invalid API key. Set {0} or pass `api_key` in the client config")]
    InvalidApiKey(String),

    /// HTTP request failed
    #[error("Request failed: {0}")]
    Request(String),

    /// Response parsing failed
    #[error("Response error: {0}")]
    Response(String),

    /// The API answered with a structured `{"error": {...}}` body
    #[error("API error (status {status}): {error}")]
    Upstream { status: u16, error: ErrorObject },

    /// Authentication failed
    #[error("Authentication failed: {0}. Check your API key.")]
    Auth(String),

    /// Timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for GptError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GptError::Timeout(err.to_string())
        } else if err.is_connect() {
            GptError::Request(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            GptError::Response(format!("Failed to decode response: {}", err))
        } else {
            GptError::Request(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GptError {
    fn from(err: serde_json::Error) -> Self {
        GptError::Response(format!("JSON parsing error: {}", err))
    }
}

impl From<std::io::Error> for GptError {
    fn from(err: std::io::Error) -> Self {
        GptError::Config(format!("IO error: {}", err))
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, GptError>;

/// Failures that end a stream. Each one reaches the error callback exactly once.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A non-empty line did not start with `data: `
    #[error("Malformed stream line (missing `data: ` prefix): {0}")]
    Framing(String),

    /// The payload after `data: ` was not a valid event record
    #[error("Failed to parse stream payload: {source}. Data: {payload}")]
    PayloadParse {
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    /// The API reported an error, either as the body of a non-success
    /// response (`status` set) or as an event inside the stream
    #[error("API error{}: {error}", status_suffix(.status))]
    Upstream {
        status: Option<u16>,
        error: ErrorObject,
    },

    /// Non-success response whose body has no `error` field
    #[error("Unknown API response (status {status}): {body}")]
    UnknownUpstream { status: u16, body: String },

    /// The connection or body reader failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// A line grew past the configured bound
    #[error("Stream line exceeded {limit} bytes")]
    LineTooLong { limit: usize },
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {})", code),
        None => String::new(),
    }
}

impl StreamError {
    /// Short, stable name of the error kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::Framing(_) => "framing",
            StreamError::PayloadParse { .. } => "payload_parse",
            StreamError::Upstream { .. } => "upstream",
            StreamError::UnknownUpstream { .. } => "unknown_upstream",
            StreamError::Transport(_) => "transport",
            StreamError::LineTooLong { .. } => "line_too_long",
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

impl From<std::convert::Infallible> for StreamError {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}
