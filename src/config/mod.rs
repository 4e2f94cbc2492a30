//! Configuration Module
//!
//! Handles client configuration loading and defaults.

pub mod client;
pub mod loader;

pub use client::{ClientConfig, ConfigOverlay};
pub use loader::ConfigLoader;
