//! Transport guard wiring.
//!
//! Translates a sink's `error`, `close` and `finish` events into benign or
//! fatal aborts of the owning stream.

use std::sync::{Arc, Mutex, PoisonError};

use sluice_core::{ListenerId, RenderError};

use crate::classify::BenignPattern;
use crate::sink::{SinkError, TransportEvent, TransportEventKind, TransportSink};

/// Reason used when a benign transport error ends the stream.
pub const CLIENT_DISCONNECTED: &str = "Client disconnected during stream";
/// Reason used when the sink closes before the stream finished.
pub const WRITABLE_CLOSED: &str = "Writable closed early (likely client disconnect)";
/// Reason used when the sink finishes normally.
pub const STREAM_FINISHED: &str = "Stream finished (normal completion)";

type ReasonFn = Box<dyn Fn(&str) + Send + Sync>;
type ErrorFn = Box<dyn Fn(RenderError) + Send + Sync>;
type NotifyFn = Box<dyn Fn(&RenderError) + Send + Sync>;
type FinishFn = Box<dyn Fn() + Send + Sync>;

/// Callbacks the guards route transport events into.
pub struct GuardCallbacks {
    benign_abort: ReasonFn,
    fatal_abort: ErrorFn,
    on_error: Option<NotifyFn>,
    on_finish: Option<FinishFn>,
    benign_pattern: BenignPattern,
}

impl GuardCallbacks {
    /// Create callbacks from the two abort paths.
    pub fn new<B, F>(benign_abort: B, fatal_abort: F) -> Self
    where
        B: Fn(&str) + Send + Sync + 'static,
        F: Fn(RenderError) + Send + Sync + 'static,
    {
        Self {
            benign_abort: Box::new(benign_abort),
            fatal_abort: Box::new(fatal_abort),
            on_error: None,
            on_finish: None,
            benign_pattern: BenignPattern::default(),
        }
    }

    /// Notify before a fatal transport error aborts the stream.
    pub fn on_error<E>(mut self, on_error: E) -> Self
    where
        E: Fn(&RenderError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(on_error));
        self
    }

    /// Route `finish` here instead of a benign abort.
    pub fn on_finish<C>(mut self, on_finish: C) -> Self
    where
        C: Fn() + Send + Sync + 'static,
    {
        self.on_finish = Some(Box::new(on_finish));
        self
    }

    /// Override the benign error pattern.
    pub fn benign_pattern(mut self, pattern: BenignPattern) -> Self {
        self.benign_pattern = pattern;
        self
    }

    fn handle(&self, event: TransportEvent) {
        match event {
            TransportEvent::Error(err) => {
                if self.benign_pattern.is_benign_error(&err) {
                    (self.benign_abort)(CLIENT_DISCONNECTED);
                } else {
                    if let Some(on_error) = &self.on_error {
                        on_error(&err);
                    }
                    (self.fatal_abort)(err);
                }
            }
            TransportEvent::Close => (self.benign_abort)(WRITABLE_CLOSED),
            TransportEvent::Finish => match &self.on_finish {
                Some(on_finish) => on_finish(),
                None => (self.benign_abort)(STREAM_FINISHED),
            },
        }
    }
}

/// Listeners attached to a sink; detach them with [`TransportGuards::cleanup`].
pub struct TransportGuards {
    sink: Arc<dyn TransportSink>,
    ids: Mutex<Vec<ListenerId>>,
}

impl TransportGuards {
    /// Attach one-shot `error`, `close` and `finish` listeners to `sink`.
    pub fn wire(sink: Arc<dyn TransportSink>, callbacks: GuardCallbacks) -> Self {
        let callbacks = Arc::new(callbacks);
        let ids = [
            TransportEventKind::Error,
            TransportEventKind::Close,
            TransportEventKind::Finish,
        ]
        .into_iter()
        .map(|kind| {
            let callbacks = callbacks.clone();
            sink.once(kind, Box::new(move |event| callbacks.handle(event)))
        })
        .collect();

        Self {
            sink,
            ids: Mutex::new(ids),
        }
    }

    /// Detach every listener.
    ///
    /// Each removal is attempted even if an earlier one fails; failures are
    /// returned for diagnostics only. A listener that already fired is gone
    /// and counts as detached. Calling this again is a no-op.
    pub fn cleanup(&self) -> Vec<SinkError> {
        let ids = std::mem::take(&mut *self.ids.lock().unwrap_or_else(PoisonError::into_inner));
        ids.into_iter()
            .filter_map(|id| match self.sink.remove_listener(id) {
                Ok(()) | Err(SinkError::ListenerNotRegistered(_)) => None,
                Err(err) => Some(err),
            })
            .collect()
    }
}
