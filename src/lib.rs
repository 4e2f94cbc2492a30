//! GPTChat - Chat Completion Client
//!
//! A client for `/v1/chat/completions` with a streaming pipeline that turns a
//! chunked response body into message, done and error callbacks.
//!
//! ```no_run
//! use gptchat::{ChatOptions, ClientConfig, GptChat, Message};
//!
//! # async fn run() -> gptchat::error::Result<()> {
//! let chat = GptChat::new(ClientConfig::with_api_key("sk-..."))?;
//!
//! let handle = chat.chat_stream(vec![Message::user("Hello!")], &ChatOptions::new());
//! handle
//!     .on_message(|delta, _| print!("{}", delta))
//!     .on_done(|reason| println!("\n[{}]", reason))
//!     .on_error(|err| eprintln!("stream failed: {}", err));
//! handle.finished().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod stream;

pub use api::{
    ChatOptions, ChatRequest, ChatResponse, ErrorObject, EventRecord, Message, Role,
    StopSequence, StreamAccumulator,
};
pub use config::{ClientConfig, ConfigLoader};
pub use error::{GptError, StreamError};
pub use stream::{StreamDispatcher, StreamHandle, StreamState};

use client::HttpClient;
use error::Result;
use std::future::Future;
use stream::StreamResponse;
use tracing::debug;

/// The main chat client
#[derive(Debug, Clone)]
pub struct GptChat {
    config: ClientConfig,
    http_client: HttpClient,
}

impl GptChat {
    /// Create a client. Fails if no non-blank API key can be resolved from
    /// the config or its environment variable.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| GptError::InvalidApiKey(config.api_key_env.clone()))?;

        let http_client = HttpClient::new(&config, api_key)?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Create a client from config files and the environment
    pub fn from_env() -> Result<Self> {
        let loader = ConfigLoader::new()?;
        Self::new(loader.into_config())
    }

    /// Create a client with a custom config path
    pub fn with_config_path(path: &str) -> Result<Self> {
        let loader = ConfigLoader::from_path(path)?;
        Self::new(loader.into_config())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Replace the API key used by subsequent requests, including streams
    /// started afterwards.
    pub fn set_api_key(&self, api_key: impl Into<String>) {
        self.http_client.set_api_key(api_key);
    }

    fn build_request(&self, messages: Vec<Message>, options: &ChatOptions) -> ChatRequest {
        if options.model.is_none() {
            debug!(model = %self.config.default_model, "no model given, using default");
        }
        ChatRequest::build(&self.config, messages, options)
    }

    /// Make a chat completion request and wait for the full response
    pub async fn chat(&self, messages: Vec<Message>, options: &ChatOptions) -> Result<ChatResponse> {
        let request = self.build_request(messages, options);
        let url = self.config.completions_url();
        debug!(model = %request.model, messages = request.messages.len(), "chat request");

        self.http_client.post_json(&url, &request).await
    }

    /// Make a chat completion request and return the first choice's content
    pub async fn simple_chat(&self, messages: Vec<Message>, options: &ChatOptions) -> Result<String> {
        let response = self.chat(messages, options).await?;
        response
            .content()
            .map(str::to_string)
            .ok_or_else(|| GptError::Response("Response has no choices".to_string()))
    }

    /// Start a streamed chat completion.
    ///
    /// Returns before the request is sent. Register callbacks on the handle;
    /// every failure from here on is delivered to its error callback.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn chat_stream(&self, messages: Vec<Message>, options: &ChatOptions) -> StreamHandle {
        self.stream_dispatcher().start(self.stream_request(messages, options))
    }

    /// Like [`GptChat::chat_stream`], with callbacks registered on `dispatcher`
    /// before the stream starts.
    pub fn chat_stream_with(
        &self,
        dispatcher: StreamDispatcher,
        messages: Vec<Message>,
        options: &ChatOptions,
    ) -> StreamHandle {
        dispatcher
            .with_max_line_len(self.config.max_line_bytes)
            .start(self.stream_request(messages, options))
    }

    /// Dispatcher configured for this client
    pub fn stream_dispatcher(&self) -> StreamDispatcher {
        StreamDispatcher::new().with_max_line_len(self.config.max_line_bytes)
    }

    fn stream_request(
        &self,
        messages: Vec<Message>,
        options: &ChatOptions,
    ) -> impl Future<Output = std::result::Result<StreamResponse, StreamError>> + Send + 'static {
        let request = self.build_request(messages, options).with_stream(true);
        let url = self.config.completions_url();
        let http_client = self.http_client.clone();
        debug!(model = %request.model, messages = request.messages.len(), "chat stream request");

        async move { http_client.post_stream(&url, &request).await }
    }
}
