//! Data store with a non-blocking snapshot read.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;

use crate::error::DataError;
use crate::source::DataSource;

type SharedResolve<T> = Shared<BoxFuture<'static, Result<Arc<T>, DataError>>>;

/// Future that completes when a pending store has resolved.
///
/// Clones await the same underlying resolution.
pub struct PendingData<T> {
    inner: SharedResolve<T>,
}

impl<T> Clone for PendingData<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Future for PendingData<T> {
    type Output = Result<Arc<T>, DataError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl<T> fmt::Debug for PendingData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PendingData")
    }
}

/// Result of one snapshot read.
pub enum Snapshot<T> {
    /// The value is available.
    Ready(Arc<T>),
    /// Not available yet; read again once this completes.
    Pending(PendingData<T>),
    /// The source failed.
    Failed(DataError),
}

impl<T> Snapshot<T> {
    /// The value, if ready.
    pub fn ready(&self) -> Option<&Arc<T>> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Whether the read must be retried later.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl<T> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("Snapshot::Ready"),
            Self::Pending(_) => f.write_str("Snapshot::Pending"),
            Self::Failed(err) => write!(f, "Snapshot::Failed({})", err),
        }
    }
}

enum StoreState<T> {
    Idle(DataSource<T>),
    Loading(PendingData<T>),
    Ready(Arc<T>),
    Failed(DataError),
}

/// Per-request data store.
///
/// The source is resolved at most once; later reads return the cached value
/// or failure.
pub struct DataStore<T> {
    state: Arc<Mutex<StoreState<T>>>,
}

impl<T> DataStore<T>
where
    T: Send + Sync + 'static,
{
    /// Create a store from a data source.
    pub fn new(source: DataSource<T>) -> Self {
        let state = match source {
            DataSource::Value(value) => StoreState::Ready(Arc::new(value)),
            other => StoreState::Idle(other),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Create a store holding an already resolved value.
    pub fn ready(value: T) -> Self {
        Self::new(DataSource::Value(value))
    }

    /// Read the current value without blocking.
    ///
    /// The first read of an unresolved source starts its resolution and
    /// returns `Pending`.
    pub fn snapshot(&self) -> Snapshot<T> {
        let mut state = self.lock();
        let source = match std::mem::replace(&mut *state, StoreState::Failed(DataError::Dropped)) {
            StoreState::Idle(source) => source,
            StoreState::Ready(value) => {
                *state = StoreState::Ready(value.clone());
                return Snapshot::Ready(value);
            }
            StoreState::Loading(pending) => {
                *state = StoreState::Loading(pending.clone());
                return Snapshot::Pending(pending);
            }
            StoreState::Failed(err) => {
                *state = StoreState::Failed(err.clone());
                return Snapshot::Failed(err);
            }
        };

        let future = match source {
            DataSource::Value(value) => {
                let value = Arc::new(value);
                *state = StoreState::Ready(value.clone());
                return Snapshot::Ready(value);
            }
            DataSource::Future(future) => future,
            DataSource::Factory(factory) => factory(),
        };

        let pending = PendingData {
            inner: settle_store(future, Arc::downgrade(&self.state)).boxed().shared(),
        };
        *state = StoreState::Loading(pending.clone());
        Snapshot::Pending(pending)
    }

    /// Wait until the source has resolved.
    pub async fn resolve(&self) -> Result<Arc<T>, DataError> {
        loop {
            match self.snapshot() {
                Snapshot::Ready(value) => return Ok(value),
                Snapshot::Failed(err) => return Err(err),
                Snapshot::Pending(pending) => {
                    pending.await?;
                }
            }
        }
    }

    /// Whether the store holds a resolved value.
    pub fn is_ready(&self) -> bool {
        matches!(&*self.lock(), StoreState::Ready(_))
    }

    fn lock(&self) -> MutexGuard<'_, StoreState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn settle_store<T>(
    future: BoxFuture<'static, Result<T, DataError>>,
    state: Weak<Mutex<StoreState<T>>>,
) -> Result<Arc<T>, DataError> {
    let result = future.await.map(Arc::new);
    if let Some(state) = state.upgrade() {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = match &result {
            Ok(value) => StoreState::Ready(value.clone()),
            Err(err) => StoreState::Failed(err.clone()),
        };
    }
    result
}

impl<T> fmt::Debug for DataStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let label = match &*state {
            StoreState::Idle(_) => "idle",
            StoreState::Loading(_) => "loading",
            StoreState::Ready(_) => "ready",
            StoreState::Failed(_) => "failed",
        };
        f.debug_struct("DataStore").field("state", &label).finish()
    }
}
