//! API Module
//!
//! Chat completion request/response types and streaming event records.

pub mod completion;
pub mod streaming;

pub use completion::{
    ChatOptions, ChatRequest, ChatResponse, Choice, Message, Role, StopSequence, Usage,
};
pub use streaming::{ErrorObject, EventRecord, StreamAccumulator, StreamChoice, StreamDelta};
