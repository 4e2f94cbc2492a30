//! Configuration Loader
//!
//! Loads the client configuration from defaults, JSON files and the
//! environment, in that order.

use crate::config::client::{ClientConfig, ConfigOverlay};
use crate::error::{GptError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Env var pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "GPTCHAT_CONFIG_PATH";
/// Env var overriding `base_url`
pub const BASE_URL_ENV: &str = "GPTCHAT_BASE_URL";
/// Env var overriding `default_model`
pub const MODEL_ENV: &str = "GPTCHAT_MODEL";

/// Configuration loader with support for multiple sources
pub struct ConfigLoader {
    config: ClientConfig,
}

impl ConfigLoader {
    /// Create a new config loader and load from default locations
    pub fn new() -> Result<Self> {
        // A missing .env is fine
        let _ = dotenvy::dotenv();

        let mut loader = Self {
            config: ClientConfig::default(),
        };

        loader.load_from_default_paths()?;
        loader.apply_env_overrides();

        Ok(loader)
    }

    /// Create a loader with a specific config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut loader = Self {
            config: ClientConfig::default(),
        };

        loader.load_from_file(path)?;

        Ok(loader)
    }

    /// Load configuration from default paths
    fn load_from_default_paths(&mut self) -> Result<()> {
        for path in Self::get_config_paths() {
            if path.exists() {
                self.load_from_file(&path)?;
            }
        }

        Ok(())
    }

    /// Get list of config paths to check, lowest precedence first
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".gptchat").join("config.json"));
        }

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("gptchat").join("config.json"));
        }

        paths.push(PathBuf::from("gptchat.json"));

        if let Ok(custom_path) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(custom_path));
        }

        paths
    }

    /// Load configuration from a specific file
    fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GptError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let overlay: ConfigOverlay = serde_json::from_str(&content).map_err(|e| {
            GptError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), "loaded config file");
        overlay.apply(&mut self.config);
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            self.config.base_url = url;
        }
        if let Ok(model) = std::env::var(MODEL_ENV) {
            self.config.default_model = model;
        }
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Take ownership of the configuration
    pub fn into_config(self) -> ClientConfig {
        self.config
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            config: ClientConfig::default(),
        })
    }
}
