//! Transport sink contract.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use sluice_core::{ListenerId, RenderError};

/// Events a transport sink can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportEventKind {
    Error,
    Close,
    Finish,
}

/// An emitted transport event.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The transport failed.
    Error(RenderError),
    /// The underlying connection closed.
    Close,
    /// All data has been flushed after `end`.
    Finish,
}

impl TransportEvent {
    /// The kind of this event.
    pub fn kind(&self) -> TransportEventKind {
        match self {
            Self::Error(_) => TransportEventKind::Error,
            Self::Close => TransportEventKind::Close,
            Self::Finish => TransportEventKind::Finish,
        }
    }
}

/// One-shot transport event handler.
pub type TransportHandler = Box<dyn FnOnce(TransportEvent) + Send>;

/// Error from a transport sink operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("Listener {0} is not registered")]
    ListenerNotRegistered(u64),

    #[error("Sink already destroyed")]
    AlreadyDestroyed,

    #[error("Sink operation failed: {0}")]
    Failed(String),
}

/// Writable, event-emitting response surface a render streams into.
///
/// A sink is owned by one streaming render for its lifetime. Implementations
/// must not hold internal locks while invoking handlers, since handlers may
/// call straight back into the sink.
pub trait TransportSink: Send + Sync {
    /// Write a chunk. Returns `false` when the caller should back off.
    fn write(&self, chunk: Bytes) -> bool;

    /// Finish the response; emits `Finish`.
    fn end(&self);

    /// Tear the transport down immediately.
    fn destroy(&self) -> Result<(), SinkError>;

    /// Whether `end` has been called.
    fn writable_ended(&self) -> bool;

    /// Whether `destroy` has completed.
    fn destroyed(&self) -> bool;

    /// Register a one-shot handler for `kind`.
    fn once(&self, kind: TransportEventKind, handler: TransportHandler) -> ListenerId;

    /// Remove a handler that has not fired.
    fn remove_listener(&self, id: ListenerId) -> Result<(), SinkError>;
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    listeners: Vec<(ListenerId, TransportEventKind, TransportHandler)>,
}

/// One-shot listener table shared by sink implementations.
#[derive(Default)]
pub struct ListenerRegistry {
    state: Mutex<RegistryState>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a one-shot handler.
    pub fn once(&self, kind: TransportEventKind, handler: TransportHandler) -> ListenerId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = ListenerId(state.next_id);
        state.listeners.push((id, kind, handler));
        id
    }

    /// Remove a registered handler.
    pub fn remove(&self, id: ListenerId) -> Result<(), SinkError> {
        let mut state = self.lock();
        let position = state
            .listeners
            .iter()
            .position(|(registered, _, _)| *registered == id)
            .ok_or(SinkError::ListenerNotRegistered(id.0))?;
        state.listeners.remove(position);
        Ok(())
    }

    /// Fire every handler registered for the event's kind.
    ///
    /// Handlers are detached before they run and are invoked outside the
    /// registry lock. Returns the number of handlers invoked.
    pub fn emit(&self, event: TransportEvent) -> usize {
        let kind = event.kind();
        let fired: Vec<TransportHandler> = {
            let mut state = self.lock();
            let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.listeners)
                .into_iter()
                .partition(|(_, registered, _)| *registered == kind);
            state.listeners = rest;
            matching.into_iter().map(|(_, _, handler)| handler).collect()
        };

        let count = fired.len();
        for handler in fired {
            handler(event.clone());
        }
        count
    }

    /// Number of registered handlers for `kind`.
    pub fn count(&self, kind: TransportEventKind) -> usize {
        self.lock()
            .listeners
            .iter()
            .filter(|(_, registered, _)| *registered == kind)
            .count()
    }

    /// Total number of registered handlers.
    pub fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
