//! In-memory transport sink.

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use sluice_core::{ListenerId, RenderError};

use crate::sink::{
    ListenerRegistry, SinkError, TransportEvent, TransportEventKind, TransportHandler,
    TransportSink,
};

#[derive(Debug, Default)]
struct MemoryState {
    chunks: Vec<Bytes>,
    ended: bool,
    destroyed: bool,
    destroy_calls: usize,
    fail_destroy: bool,
    fail_remove: bool,
}

/// Sink that buffers everything written to it.
///
/// Events are emitted manually with [`MemorySink::emit_error`] and
/// [`MemorySink::emit_close`]; `end` emits `Finish`. Fault injection for
/// `destroy` and listener removal exercises best-effort teardown.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
    listeners: ListenerRegistry,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `destroy` fail.
    pub fn fail_destroy(self) -> Self {
        self.lock().fail_destroy = true;
        self
    }

    /// Make `remove_listener` fail.
    pub fn fail_listener_removal(self) -> Self {
        self.lock().fail_remove = true;
        self
    }

    /// Emit an `Error` event.
    pub fn emit_error(&self, err: io::Error) -> usize {
        self.listeners
            .emit(TransportEvent::Error(RenderError::from(err)))
    }

    /// Emit a `Close` event.
    pub fn emit_close(&self) -> usize {
        self.listeners.emit(TransportEvent::Close)
    }

    /// Chunks written so far.
    pub fn chunks(&self) -> Vec<Bytes> {
        self.lock().chunks.clone()
    }

    /// Everything written, concatenated.
    pub fn body(&self) -> Bytes {
        let state = self.lock();
        let mut body = BytesMut::new();
        for chunk in &state.chunks {
            body.extend_from_slice(chunk);
        }
        body.freeze()
    }

    /// Everything written, as lossy UTF-8.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body()).into_owned()
    }

    /// Number of times `destroy` was called.
    pub fn destroy_calls(&self) -> usize {
        self.lock().destroy_calls
    }

    /// Number of registered listeners for `kind`.
    pub fn listener_count(&self, kind: TransportEventKind) -> usize {
        self.listeners.count(kind)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TransportSink for MemorySink {
    fn write(&self, chunk: Bytes) -> bool {
        let mut state = self.lock();
        if state.ended || state.destroyed {
            return false;
        }
        state.chunks.push(chunk);
        true
    }

    fn end(&self) {
        {
            let mut state = self.lock();
            if state.ended || state.destroyed {
                return;
            }
            state.ended = true;
        }
        self.listeners.emit(TransportEvent::Finish);
    }

    fn destroy(&self) -> Result<(), SinkError> {
        {
            let mut state = self.lock();
            state.destroy_calls += 1;
            if state.fail_destroy {
                return Err(SinkError::Failed("destroy refused".to_string()));
            }
            if state.destroyed {
                return Err(SinkError::AlreadyDestroyed);
            }
            state.destroyed = true;
        }
        self.listeners.emit(TransportEvent::Close);
        Ok(())
    }

    fn writable_ended(&self) -> bool {
        self.lock().ended
    }

    fn destroyed(&self) -> bool {
        self.lock().destroyed
    }

    fn once(&self, kind: TransportEventKind, handler: TransportHandler) -> ListenerId {
        self.listeners.once(kind, handler)
    }

    fn remove_listener(&self, id: ListenerId) -> Result<(), SinkError> {
        if self.lock().fail_remove {
            return Err(SinkError::Failed(format!("cannot remove listener {}", id)));
        }
        self.listeners.remove(id)
    }
}
