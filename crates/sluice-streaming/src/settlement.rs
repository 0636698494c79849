//! Single-assignment completion gate.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use sluice_core::RenderError;
use tokio::sync::watch;

/// Observable state of a [`Settlement`].
#[derive(Debug, Clone)]
pub enum Outcome {
    Pending,
    Resolved,
    Rejected(RenderError),
}

impl Outcome {
    /// Whether a terminal transition has happened.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Resolves or rejects exactly once. The first writer wins and every later
/// call, of either kind, is ignored.
#[derive(Clone)]
pub struct Settlement {
    tx: Arc<watch::Sender<Outcome>>,
}

impl Settlement {
    /// Create an unsettled gate.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Outcome::Pending);
        Self { tx: Arc::new(tx) }
    }

    /// Create a gate that is already resolved.
    pub fn resolved() -> Self {
        let settlement = Self::new();
        settlement.resolve();
        settlement
    }

    /// Resolve. Returns `false` if already settled.
    pub fn resolve(&self) -> bool {
        self.transition(Outcome::Resolved)
    }

    /// Reject with `err`. Returns `false` if already settled.
    pub fn reject(&self, err: RenderError) -> bool {
        self.transition(Outcome::Rejected(err))
    }

    /// Whether a terminal transition has happened.
    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_settled()
    }

    /// Current outcome.
    pub fn outcome(&self) -> Outcome {
        self.tx.borrow().clone()
    }

    /// Future completing with the terminal outcome.
    pub fn done(&self) -> Done {
        let mut rx = self.tx.subscribe();
        let wait = async move {
            let outcome = rx
                .wait_for(Outcome::is_settled)
                .await
                .map(|outcome| outcome.clone());
            match outcome {
                Ok(Outcome::Rejected(err)) => Err(err),
                Ok(_) => Ok(()),
                Err(_) => Err(RenderError::Aborted(
                    "stream dropped before settling".to_string(),
                )),
            }
        };
        Done {
            inner: wait.boxed(),
        }
    }

    fn transition(&self, next: Outcome) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_settled() {
                return false;
            }
            *current = next;
            true
        })
    }
}

impl Default for Settlement {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settlement")
            .field("outcome", &*self.tx.borrow())
            .finish()
    }
}

/// Awaitable completion of a [`Settlement`].
///
/// Resolves to `Ok(())` on success or benign cancellation and to the
/// original error on fatal failure.
pub struct Done {
    inner: BoxFuture<'static, Result<(), RenderError>>,
}

impl Future for Done {
    type Output = Result<(), RenderError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Done")
    }
}
