//! Client Configuration
//!
//! Defines the configuration schema for the chat client.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Upper bound for a pending stream line (1 MiB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API key. Never written back out.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key when `api_key` is unset
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL for the API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used when a call does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// System message prepended to conversations that have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_system_message: Option<String>,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Overall request timeout in seconds.
    ///
    /// Unset by default: a streamed completion can legitimately stay open for
    /// minutes, and reqwest applies this timeout to the whole body read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Largest stream line, in bytes, before the stream fails.
    /// `null` removes the bound.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: Option<usize>,
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_line_bytes() -> Option<usize> {
    Some(DEFAULT_MAX_LINE_BYTES)
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            default_model: default_model(),
            default_system_message: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: None,
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl ClientConfig {
    /// Config with an explicit API key and defaults for everything else
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Resolve the API key: explicit key first, then the configured env var.
    /// Blank keys count as missing.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Full URL of the chat completions endpoint
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// A partial configuration, as read from a file. Set fields override the
/// config they are applied to.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverlay {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub default_system_message: Option<String>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// `Some(None)` (explicit `null`) removes the bound
    #[serde(default, deserialize_with = "deserialize_explicit_null")]
    pub max_line_bytes: Option<Option<usize>>,
}

fn deserialize_explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<usize>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<usize>::deserialize(deserializer).map(Some)
}

impl ConfigOverlay {
    /// Apply set fields on top of `config`
    pub fn apply(self, config: &mut ClientConfig) {
        if let Some(key) = self.api_key {
            config.api_key = Some(key);
        }
        if let Some(env) = self.api_key_env {
            config.api_key_env = env;
        }
        if let Some(url) = self.base_url {
            config.base_url = url;
        }
        if let Some(model) = self.default_model {
            config.default_model = model;
        }
        if let Some(system) = self.default_system_message {
            config.default_system_message = Some(system);
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout_secs = secs;
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout_secs = Some(secs);
        }
        if let Some(limit) = self.max_line_bytes {
            config.max_line_bytes = limit;
        }
    }
}
