//! Event Decoder
//!
//! Turns lines of a `data: <json>` stream into event records.

use crate::api::streaming::EventRecord;
use crate::error::StreamError;
use async_stream::try_stream;
use futures::{Stream, StreamExt};

/// Prefix every event line carries
pub const DATA_PREFIX: &str = "data: ";

/// Line that ends the stream
pub const DONE_SENTINEL: &str = "data: [DONE]";

/// What a single line means to the decoder
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Blank line, nothing to do
    Skip,
    /// Termination sentinel
    Done,
    /// A decoded event
    Event(EventRecord),
}

/// Decode one line.
///
/// One trailing `\r` is dropped first so CRLF-framed streams decode the same
/// as LF-framed ones.
pub fn decode_line(line: &str) -> Result<LineOutcome, StreamError> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if line.is_empty() {
        return Ok(LineOutcome::Skip);
    }
    if line == DONE_SENTINEL {
        return Ok(LineOutcome::Done);
    }

    let payload = line
        .strip_prefix(DATA_PREFIX)
        .ok_or_else(|| StreamError::Framing(line.to_string()))?;

    serde_json::from_str(payload)
        .map(LineOutcome::Event)
        .map_err(|source| StreamError::PayloadParse {
            payload: payload.to_string(),
            source,
        })
}

/// Lazily decode a line stream into event records.
///
/// Ends at the sentinel (remaining lines are never pulled), when the lines run
/// out, or right after the first error.
pub fn decode_events<S>(lines: S) -> impl Stream<Item = Result<EventRecord, StreamError>>
where
    S: Stream<Item = Result<String, StreamError>>,
{
    try_stream! {
        let mut lines = Box::pin(lines);
        while let Some(line) = lines.next().await {
            match decode_line(&line?)? {
                LineOutcome::Skip => continue,
                LineOutcome::Done => break,
                LineOutcome::Event(record) => yield record,
            }
        }
    }
}
