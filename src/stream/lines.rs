//! Line Splitter
//!
//! Re-segments a body of arbitrarily sized chunks into newline-delimited
//! lines. Splitting happens on bytes: `\n` never occurs inside a multi-byte
//! UTF-8 sequence, so a character split across two chunks is decoded only
//! once its line is complete.

use crate::error::StreamError;
use bytes::BytesMut;
use futures::{ready, Stream};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// Stream of complete lines (without the trailing `\n`) over a chunk source.
    ///
    /// The source is polled only when no complete line is buffered. A final
    /// line without a trailing newline is emitted when the source ends; an
    /// empty remainder is not. After the source ends or fails the splitter
    /// yields `None` forever.
    pub struct LineSplitter<S> {
        #[pin]
        source: S,
        buf: BytesMut,
        // Bytes of `buf` already known to hold no newline
        scanned: usize,
        max_line_len: Option<usize>,
        finished: bool,
    }
}

impl<S> LineSplitter<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            buf: BytesMut::new(),
            scanned: 0,
            max_line_len: None,
            finished: false,
        }
    }

    /// Fail the stream with `LineTooLong` once a line, complete or pending,
    /// exceeds `limit` bytes. `None` leaves lines unbounded.
    pub fn with_max_line_len(mut self, limit: Option<usize>) -> Self {
        self.max_line_len = limit;
        self
    }

    /// Bytes buffered for the current partial line
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl<S, B, E> Stream for LineSplitter<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<StreamError>,
{
    type Item = Result<String, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if *this.finished {
                return Poll::Ready(None);
            }

            if let Some(pos) = this.buf[*this.scanned..].iter().position(|b| *b == b'\n') {
                let end = *this.scanned + pos;
                if let Some(limit) = this.max_line_len.filter(|limit| end > *limit) {
                    *this.finished = true;
                    this.buf.clear();
                    return Poll::Ready(Some(Err(StreamError::LineTooLong { limit })));
                }
                let line = this.buf.split_to(end + 1);
                let line = decode_line(&line[..end]);
                *this.scanned = 0;
                return Poll::Ready(Some(Ok(line)));
            }
            *this.scanned = this.buf.len();

            if let Some(limit) = *this.max_line_len {
                if this.buf.len() > limit {
                    *this.finished = true;
                    this.buf.clear();
                    return Poll::Ready(Some(Err(StreamError::LineTooLong { limit })));
                }
            }

            match ready!(this.source.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => {
                    this.buf.extend_from_slice(chunk.as_ref());
                }
                Some(Err(err)) => {
                    *this.finished = true;
                    this.buf.clear();
                    return Poll::Ready(Some(Err(err.into())));
                }
                None => {
                    *this.finished = true;
                    if this.buf.is_empty() {
                        return Poll::Ready(None);
                    }
                    let line = decode_line(&this.buf[..]);
                    this.buf.clear();
                    return Poll::Ready(Some(Ok(line)));
                }
            }
        }
    }
}
