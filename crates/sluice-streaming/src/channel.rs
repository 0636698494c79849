//! Channel-backed transport sink for HTTP body streaming.

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use sluice_core::{ListenerId, RenderError};
use tokio::sync::mpsc;

use crate::sink::{
    ListenerRegistry, SinkError, TransportEvent, TransportEventKind, TransportHandler,
    TransportSink,
};

struct ChannelState {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    ended: bool,
    destroyed: bool,
}

/// Sink forwarding chunks into an unbounded channel.
///
/// The receiving half is typically wrapped into a streaming HTTP body. A
/// dropped receiver surfaces as a `BrokenPipe` error event, which the
/// default classifier treats as a client disconnect. Ending or destroying
/// the sink drops the sender so the body stream terminates.
pub struct ChannelSink {
    state: Mutex<ChannelState>,
    listeners: ListenerRegistry,
}

impl ChannelSink {
    /// Create a sink and its receiving half.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            state: Mutex::new(ChannelState {
                tx: Some(tx),
                ended: false,
                destroyed: false,
            }),
            listeners: ListenerRegistry::new(),
        };
        (sink, rx)
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TransportSink for ChannelSink {
    fn write(&self, chunk: Bytes) -> bool {
        let sent = {
            let state = self.lock();
            match &state.tx {
                Some(tx) => tx.send(chunk).is_ok(),
                None => return false,
            }
        };

        if !sent {
            let err = io::Error::new(io::ErrorKind::BrokenPipe, "write EPIPE: receiver dropped");
            self.listeners
                .emit(TransportEvent::Error(RenderError::from(err)));
        }
        sent
    }

    fn end(&self) {
        {
            let mut state = self.lock();
            if state.ended || state.destroyed {
                return;
            }
            state.ended = true;
            state.tx = None;
        }
        self.listeners.emit(TransportEvent::Finish);
    }

    fn destroy(&self) -> Result<(), SinkError> {
        {
            let mut state = self.lock();
            if state.destroyed {
                return Err(SinkError::AlreadyDestroyed);
            }
            state.destroyed = true;
            state.tx = None;
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
        self.listeners.remove(id)
    }
}
