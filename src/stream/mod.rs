//! Stream Module
//!
//! The streaming pipeline: response body → lines → event records → callbacks.

pub mod decoder;
pub mod dispatcher;
pub mod lines;
pub mod response;

pub use decoder::{decode_events, decode_line, LineOutcome, DATA_PREFIX, DONE_SENTINEL};
pub use dispatcher::{StreamDispatcher, StreamHandle, StreamState};
pub use lines::LineSplitter;
pub use response::{ByteStream, StreamResponse};
