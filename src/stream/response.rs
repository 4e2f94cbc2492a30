//! Stream Response
//!
//! The HTTP response a stream is read from: a status code and a body of byte
//! chunks. Built from a `reqwest::Response` in production and from plain
//! streams in tests.

use crate::api::streaming::ErrorObject;
use crate::error::StreamError;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt};

/// Boxed body stream
pub type ByteStream = BoxStream<'static, Result<Bytes, StreamError>>;

/// Longest error body kept in `UnknownUpstream`
const MAX_ERROR_BODY: usize = 300;

/// Most bytes read from the body of a failed response
pub const MAX_ERROR_READ: usize = 64 * 1024;

pub struct StreamResponse {
    status: u16,
    body: ByteStream,
}

impl StreamResponse {
    pub fn new<S>(status: u16, body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
    {
        Self {
            status,
            body: body.boxed(),
        }
    }

    /// Response whose body is already fully known
    pub fn from_text(status: u16, body: impl Into<String>) -> Self {
        let bytes = Bytes::from(body.into());
        Self::new(status, futures::stream::once(async move { Ok(bytes) }))
    }

    pub fn from_reqwest(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.bytes_stream().map_err(StreamError::from);
        Self::new(status, body)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn into_body(self) -> ByteStream {
        self.body
    }

    /// Read the body of a failed response, up to [`MAX_ERROR_READ`] bytes,
    /// and turn it into the error it describes.
    pub async fn into_error(self) -> StreamError {
        let status = self.status;
        let mut body = Vec::new();
        let mut chunks = self.body;
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    let room = MAX_ERROR_READ - body.len();
                    body.extend_from_slice(&bytes[..bytes.len().min(room)]);
                    if body.len() == MAX_ERROR_READ {
                        break;
                    }
                }
                Err(err) => return err,
            }
        }

        upstream_error(status, &body)
    }
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Map a non-success body: `{"error": ...}` is an upstream error, anything
/// else (including `"error": null`) is reported as an unknown response.
pub fn upstream_error(status: u16, body: &[u8]) -> StreamError {
    match error_field(body) {
        Some(error) => StreamError::Upstream {
            status: Some(status),
            error: ErrorObject::from_value(error),
        },
        None => StreamError::UnknownUpstream {
            status,
            body: truncate(&String::from_utf8_lossy(body), MAX_ERROR_BODY),
        },
    }
}

/// The non-null `error` field of a JSON object body
pub(crate) fn error_field(body: &[u8]) -> Option<serde_json::Value> {
    match serde_json::from_slice::<serde_json::Value>(body).ok()? {
        serde_json::Value::Object(mut obj) => obj.remove("error").filter(|e| !e.is_null()),
        _ => None,
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_body_with_error_field() {
        let response = StreamResponse::from_text(429, r#"{"error":{"message":"rate limited"}}"#);
        assert!(!response.is_success());

        match response.into_error().await {
            StreamError::Upstream { status, error } => {
                assert_eq!(status, Some(429));
                assert_eq!(error.message.as_deref(), Some("rate limited"));
            }
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_body_without_error_field() {
        let response = StreamResponse::from_text(502, "<html>Bad Gateway</html>");
        match response.into_error().await {
            StreamError::UnknownUpstream { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "<html>Bad Gateway</html>");
            }
            other => panic!("expected unknown upstream error, got {:?}", other),
        }

        let response = StreamResponse::from_text(500, r#"{"detail":"oops"}"#);
        assert!(matches!(
            response.into_error().await,
            StreamError::UnknownUpstream { status: 500, .. }
        ));
    }

    #[tokio::test]
    async fn test_null_error_field_is_unknown() {
        let response = StreamResponse::from_text(500, r#"{"error":null}"#);
        match response.into_error().await {
            StreamError::UnknownUpstream { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, r#"{"error":null}"#);
            }
            other => panic!("expected unknown upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_body_read_is_bounded() {
        // An endless body must not be buffered in full
        let body = futures::stream::iter(std::iter::repeat_with(|| Ok(Bytes::from_static(&[b'x'; 1000]))));
        let response = StreamResponse::new(503, body);
        match response.into_error().await {
            StreamError::UnknownUpstream { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body.len(), MAX_ERROR_BODY + "...".len());
            }
            other => panic!("expected unknown upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_body_transport_failure() {
        let body = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"{\"err")),
            Err(StreamError::Transport("reset".into())),
        ]);
        let response = StreamResponse::new(500, body);
        assert!(matches!(
            response.into_error().await,
            StreamError::Transport(_)
        ));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 3), "é...");
    }
}
