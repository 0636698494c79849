//! Data sources accepted by a render.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::DataError;

/// Boxed future resolving a data source.
pub type DataFuture<T> = BoxFuture<'static, Result<T, DataError>>;

/// Initial data for one render.
///
/// Owned by the render that created it and never shared across requests.
pub enum DataSource<T> {
    /// Already resolved.
    Value(T),
    /// In flight.
    Future(DataFuture<T>),
    /// Started lazily on first read.
    Factory(Box<dyn FnOnce() -> DataFuture<T> + Send>),
}

impl<T> DataSource<T> {
    /// Wrap a resolved value.
    pub fn value(value: T) -> Self {
        Self::Value(value)
    }

    /// Wrap a future.
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, DataError>> + Send + 'static,
    {
        Self::Future(future.boxed())
    }

    /// Wrap a factory producing a future.
    pub fn factory<F, Fut>(factory: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, DataError>> + Send + 'static,
    {
        Self::Factory(Box::new(move || factory().boxed()))
    }

    /// Whether the source is already resolved.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

impl<T> fmt::Debug for DataSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("DataSource::Value"),
            Self::Future(_) => f.write_str("DataSource::Future"),
            Self::Factory(_) => f.write_str("DataSource::Factory"),
        }
    }
}
