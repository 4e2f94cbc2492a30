//! Stream Dispatcher
//!
//! Drives a streamed response through the line splitter and event decoder and
//! routes each outcome to the registered callbacks.
//!
//! Contract:
//! - Message callbacks fire in arrival order, once per event record.
//! - At most one terminal callback fires (`on_done` or `on_error`), and it is
//!   always the last call on the handle.
//! - A callback that is not registered when its event is dispatched does not
//!   fire. Nothing is buffered for later registration.

use crate::api::streaming::EventRecord;
use crate::error::StreamError;
use crate::stream::decoder::decode_events;
use crate::stream::lines::LineSplitter;
use crate::stream::response::StreamResponse;
use futures::StreamExt;
use parking_lot::Mutex;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

type MessageCallback = Box<dyn FnMut(&str, &EventRecord) + Send>;
type DoneCallback = Box<dyn FnOnce(&str) + Send>;
type ErrorCallback = Box<dyn FnOnce(StreamError) + Send>;

/// Lifecycle of one stream. `Done` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Done,
    Failed,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamState::Open)
    }
}

#[derive(Default)]
struct Callbacks {
    on_message: Option<MessageCallback>,
    on_done: Option<DoneCallback>,
    on_error: Option<ErrorCallback>,
}

/// State shared between the handle and the driving task
struct Shared {
    callbacks: Mutex<Callbacks>,
    state: Mutex<StreamState>,
}

impl Shared {
    fn new(callbacks: Callbacks) -> Self {
        Self {
            callbacks: Mutex::new(callbacks),
            state: Mutex::new(StreamState::Open),
        }
    }

    fn state(&self) -> StreamState {
        *self.state.lock()
    }

    /// Move from `Open` to `to`. Returns false if the stream already ended.
    fn transition(&self, to: StreamState) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return false;
        }
        *state = to;
        true
    }

    fn register(&self, apply: impl FnOnce(&mut Callbacks)) {
        if self.state().is_terminal() {
            return;
        }
        let mut callbacks = self.callbacks.lock();
        apply(&mut *callbacks);
    }

    // Callbacks run with the lock released so they may register callbacks
    // themselves.
    fn message(&self, delta: &str, record: &EventRecord) {
        if self.state().is_terminal() {
            return;
        }
        let callback = self.callbacks.lock().on_message.take();
        if let Some(mut callback) = callback {
            callback(delta, record);
            let mut callbacks = self.callbacks.lock();
            if callbacks.on_message.is_none() {
                callbacks.on_message = Some(callback);
            }
        }
    }

    fn done(&self, finish_reason: &str) {
        if !self.transition(StreamState::Done) {
            return;
        }
        debug!(finish_reason, "stream done");
        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        if let Some(callback) = callbacks.on_done {
            callback(finish_reason);
        }
    }

    fn fail(&self, err: StreamError) {
        if !self.transition(StreamState::Failed) {
            return;
        }
        warn!(kind = err.kind(), error = %err, "stream failed");
        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        if let Some(callback) = callbacks.on_error {
            callback(err);
        }
    }

    /// End without a finish reason (sentinel or end of body). No callback.
    fn finish(&self) {
        if self.transition(StreamState::Done) {
            debug!("stream ended without finish reason");
            drop(std::mem::take(&mut *self.callbacks.lock()));
        }
    }

    /// Stop without reporting anything; the caller asked for it.
    fn cancel(&self) {
        if self.transition(StreamState::Failed) {
            debug!("stream cancelled");
            drop(std::mem::take(&mut *self.callbacks.lock()));
        }
    }

    fn dispatch(&self, record: &EventRecord) -> ControlFlow<()> {
        if let Some(error) = &record.error {
            self.fail(StreamError::Upstream {
                status: None,
                error: error.clone(),
            });
            return ControlFlow::Break(());
        }

        match record.finish_reason() {
            Some(reason) => {
                if let Some(content) = record.content().filter(|c| !c.is_empty()) {
                    self.message(content, record);
                }
                self.done(reason);
                ControlFlow::Break(())
            }
            None => {
                // Chunks without content (role-only, usage-only) still reach
                // the caller as an empty delta.
                self.message(record.content().unwrap_or(""), record);
                ControlFlow::Continue(())
            }
        }
    }
}

/// Builds the callback registry and starts a stream.
///
/// Callbacks registered here are in place before the stream starts, so they
/// can never miss an event.
pub struct StreamDispatcher {
    callbacks: Callbacks,
    max_line_len: Option<usize>,
}

impl StreamDispatcher {
    pub fn new() -> Self {
        Self {
            callbacks: Callbacks::default(),
            max_line_len: None,
        }
    }

    /// Longest accepted line, see [`LineSplitter::with_max_line_len`]
    pub fn with_max_line_len(mut self, limit: Option<usize>) -> Self {
        self.max_line_len = limit;
        self
    }

    pub fn on_message<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&str, &EventRecord) + Send + 'static,
    {
        self.callbacks.on_message = Some(Box::new(callback));
        self
    }

    pub fn on_done<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&str) + Send + 'static,
    {
        self.callbacks.on_done = Some(Box::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(StreamError) + Send + 'static,
    {
        self.callbacks.on_error = Some(Box::new(callback));
        self
    }

    /// Spawn the stream on the current tokio runtime and return its handle
    /// right away, before the response is available.
    ///
    /// `response` resolves to the HTTP response, or to the transport error
    /// that prevented one. Errors after this point never surface here: they
    /// go to the error callback.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn start<F>(self, response: F) -> StreamHandle
    where
        F: Future<Output = Result<StreamResponse, StreamError>> + Send + 'static,
    {
        let shared = Arc::new(Shared::new(self.callbacks));
        let task = tokio::spawn(drive(shared.clone(), response, self.max_line_len));
        StreamHandle { shared, task }
    }
}

impl Default for StreamDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

async fn drive<F>(shared: Arc<Shared>, response: F, max_line_len: Option<usize>)
where
    F: Future<Output = Result<StreamResponse, StreamError>>,
{
    let response = match response.await {
        Ok(response) => response,
        Err(err) => return shared.fail(err),
    };

    if !response.is_success() {
        debug!(status = response.status(), "stream request rejected");
        let err = response.into_error().await;
        return shared.fail(err);
    }

    let lines = LineSplitter::new(response.into_body()).with_max_line_len(max_line_len);
    let mut events = Box::pin(decode_events(lines));
    let mut received = 0usize;

    while let Some(event) = events.next().await {
        if shared.state().is_terminal() {
            return;
        }
        match event {
            Ok(record) => {
                received += 1;
                trace!(received, "stream event");
                if shared.dispatch(&record).is_break() {
                    return;
                }
            }
            Err(err) => return shared.fail(err),
        }
    }

    shared.finish();
}

/// Handle to a running stream: the callback registry plus its state.
///
/// Registering replaces any earlier callback for the same slot. Dropping the
/// handle detaches the stream, which keeps running and calling the
/// registered callbacks; use [`StreamHandle::cancel`] to stop it.
pub struct StreamHandle {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Called with each content delta (possibly empty) and the full record
    pub fn on_message<F>(&self, callback: F) -> &Self
    where
        F: FnMut(&str, &EventRecord) + Send + 'static,
    {
        self.shared
            .register(|c| c.on_message = Some(Box::new(callback)));
        self
    }

    /// Called once with the finish reason
    pub fn on_done<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&str) + Send + 'static,
    {
        self.shared.register(|c| c.on_done = Some(Box::new(callback)));
        self
    }

    /// Called once with the error that ended the stream
    pub fn on_error<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(StreamError) + Send + 'static,
    {
        self.shared.register(|c| c.on_error = Some(Box::new(callback)));
        self
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    /// Stop the stream and release the connection. No callback fires; an
    /// open stream ends up `Failed`.
    pub fn cancel(&self) {
        self.shared.cancel();
        self.task.abort();
    }

    /// Wait for the stream to end and return its final state
    pub async fn finished(self) -> StreamState {
        if let Err(err) = self.task.await {
            if err.is_panic() {
                warn!("stream task panicked");
                self.shared.cancel();
            }
        }
        self.shared.state()
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
