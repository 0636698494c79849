//! Cancellation signal with one-shot abort listeners.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::SignalError;

/// Handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type AbortListener = Box<dyn FnOnce(&str) + Send>;

#[derive(Default)]
struct SignalState {
    reason: Option<String>,
    next_id: u64,
    listeners: Vec<(ListenerId, AbortListener)>,
}

/// Observable side of an [`AbortController`].
///
/// Cloning a signal yields another handle to the same state.
#[derive(Clone, Default)]
pub struct AbortSignal {
    state: Arc<Mutex<SignalState>>,
}

impl AbortSignal {
    /// Create a signal that is already aborted.
    pub fn aborted(reason: impl Into<String>) -> Self {
        let signal = Self::default();
        signal.trigger(reason.into());
        signal
    }

    /// Whether the signal has fired.
    pub fn is_aborted(&self) -> bool {
        self.lock().reason.is_some()
    }

    /// The abort reason, once fired.
    pub fn reason(&self) -> Option<String> {
        self.lock().reason.clone()
    }

    /// Register a one-shot listener.
    ///
    /// Returns `None` without registering when the signal has already fired.
    pub fn add_listener<F>(&self, listener: F) -> Option<ListenerId>
    where
        F: FnOnce(&str) + Send + 'static,
    {
        let mut state = self.lock();
        if state.reason.is_some() {
            return None;
        }
        state.next_id += 1;
        let id = ListenerId(state.next_id);
        state.listeners.push((id, Box::new(listener)));
        Some(id)
    }

    /// Remove a listener that has not fired yet.
    pub fn remove_listener(&self, id: ListenerId) -> Result<(), SignalError> {
        let mut state = self.lock();
        let position = state
            .listeners
            .iter()
            .position(|(registered, _)| *registered == id)
            .ok_or(SignalError::NotRegistered(id.0))?;
        state.listeners.remove(position);
        Ok(())
    }

    /// Number of listeners still waiting for the signal.
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn trigger(&self, reason: String) -> bool {
        let listeners = {
            let mut state = self.lock();
            if state.reason.is_some() {
                return false;
            }
            state.reason = Some(reason.clone());
            std::mem::take(&mut state.listeners)
        };

        // Listeners run outside the lock so they may call back into the signal.
        for (_, listener) in listeners {
            listener(&reason);
        }
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("AbortSignal")
            .field("reason", &state.reason)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

/// Owner of an [`AbortSignal`], able to fire it.
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    /// Create a new controller with a fresh signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a handle to the controlled signal.
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Fire the signal. Returns `false` if it had already fired.
    pub fn abort(&self, reason: impl Into<String>) -> bool {
        self.signal.trigger(reason.into())
    }
}
