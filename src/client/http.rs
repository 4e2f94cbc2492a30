//! HTTP Client
//!
//! Async HTTP client with bearer authentication for JSON and streamed
//! requests.

use crate::api::streaming::ErrorObject;
use crate::config::ClientConfig;
use crate::error::{GptError, Result, StreamError};
use crate::stream::response::{error_field, truncate, StreamResponse};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Longest response body quoted in an error message
const MAX_ERROR_BODY: usize = 500;

/// HTTP client with a replaceable API key
#[derive(Clone)]
pub struct HttpClient {
    /// Inner reqwest client
    client: Client,

    /// Bearer token, shared by every clone of this client
    api_key: Arc<RwLock<String>>,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: &ClientConfig, api_key: impl Into<String>) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(10);

        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| GptError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: Arc::new(RwLock::new(api_key.into())),
        })
    }

    /// Replace the API key. Applies to requests sent from now on.
    pub fn set_api_key(&self, api_key: impl Into<String>) {
        *self.api_key.write() = api_key.into();
    }

    fn headers(&self, streaming: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if streaming {
            headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        }
        let bearer = format!("Bearer {}", self.api_key.read());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer)
                .map_err(|e| GptError::Config(format!("Invalid API key format: {}", e)))?,
        );
        Ok(headers)
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post_json<T, R>(&self, url: &str, body: &T) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .headers(self.headers(false)?)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(map_error_response(status, &text));
        }

        serde_json::from_str(&text).map_err(|e| {
            GptError::Response(format!(
                "Failed to parse response: {}. Body: {}",
                e,
                truncate(&text, MAX_ERROR_BODY)
            ))
        })
    }

    /// POST a JSON body and hand back the response without reading its body.
    ///
    /// Any status is returned as-is; deciding what a non-success status means
    /// is up to the stream dispatcher.
    pub async fn post_stream<T>(
        &self,
        url: &str,
        body: &T,
    ) -> std::result::Result<StreamResponse, StreamError>
    where
        T: Serialize + ?Sized,
    {
        let headers = self
            .headers(true)
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        debug!(status = response.status().as_u16(), "stream response received");
        Ok(StreamResponse::from_reqwest(response))
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").finish_non_exhaustive()
    }
}

fn map_error_response(status: StatusCode, body: &str) -> GptError {
    if let Some(error) = error_field(body.as_bytes()) {
        return GptError::Upstream {
            status: status.as_u16(),
            error: ErrorObject::from_value(error),
        };
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return GptError::Auth(format!("status {}", status));
    }

    GptError::Request(format!(
        "Request failed with status {}: {}",
        status,
        truncate(body, MAX_ERROR_BODY)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use mockito::Matcher;

    fn client(api_key: &str) -> HttpClient {
        HttpClient::new(&ClientConfig::default(), api_key).unwrap()
    }

    #[tokio::test]
    async fn test_post_json_success_sends_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(serde_json::json!({"model": "gpt-3.5-turbo"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let value: serde_json::Value = client("sk-test")
            .post_json(
                &format!("{}/chat/completions", server.url()),
                &serde_json::json!({"model": "gpt-3.5-turbo"}),
            )
            .await
            .unwrap();

        assert_eq!(value["ok"], true);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_api_key_applies_to_next_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-new")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let http = client("sk-old");
        http.clone().set_api_key("sk-new");
        let _: serde_json::Value = http
            .post_json(&format!("{}/chat/completions", server.url()), &serde_json::json!({}))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_json_error_body_maps_to_upstream() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"rate limited","type":"requests"}}"#)
            .create_async()
            .await;

        let err = client("sk-test")
            .post_json::<_, serde_json::Value>(
                &format!("{}/chat/completions", server.url()),
                &serde_json::json!({}),
            )
            .await
            .unwrap_err();

        match err {
            GptError::Upstream { status, error } => {
                assert_eq!(status, 429);
                assert_eq!(error.message.as_deref(), Some("rate limited"));
            }
            other => panic!("expected Upstream, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_post_json_null_error_is_request_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body(r#"{"error":null}"#)
            .create_async()
            .await;

        let err = client("sk-test")
            .post_json::<_, serde_json::Value>(
                &format!("{}/chat/completions", server.url()),
                &serde_json::json!({}),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GptError::Request(_)));
    }

    #[tokio::test]
    async fn test_post_json_unauthorized_without_error_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("nope")
            .create_async()
            .await;

        let err = client("sk-bad")
            .post_json::<_, serde_json::Value>(
                &format!("{}/chat/completions", server.url()),
                &serde_json::json!({}),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GptError::Auth(_)));
    }

    #[tokio::test]
    async fn test_post_json_bad_json_is_response_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body("not-json")
            .create_async()
            .await;

        let err = client("sk-test")
            .post_json::<_, serde_json::Value>(
                &format!("{}/chat/completions", server.url()),
                &serde_json::json!({}),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GptError::Response(_)));
    }

    #[tokio::test]
    async fn test_post_stream_returns_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("accept", "text/event-stream")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("data: [DONE]\n")
            .create_async()
            .await;

        let response = client("sk-test")
            .post_stream(
                &format!("{}/chat/completions", server.url()),
                &serde_json::json!({"stream": true}),
            )
            .await
            .unwrap();

        assert!(response.is_success());
        let chunks: Vec<bytes::Bytes> = response.into_body().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"data: [DONE]\n");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_stream_connection_failure_is_transport_error() {
        let err = client("sk-test")
            .post_stream("http://127.0.0.1:9/chat/completions", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, StreamError::Transport(_)));
    }
}
