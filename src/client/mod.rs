//! Client Module
//!
//! HTTP transport for the chat API.

pub mod http;

pub use http::HttpClient;
