//! Render engine contract.
//!
//! The facade drives any engine that can render a page to a string and to
//! an incremental stream. Engines report progress through a
//! [`StreamObserver`]; the facade decides what each signal means for the
//! stream's outcome.

use std::sync::Arc;

use sluice_core::{Meta, RenderError};
use sluice_data::DataStore;
use sluice_streaming::TransportSink;

/// Everything an engine needs to render one request.
pub struct RenderContext<T> {
    /// Request path.
    pub location: String,
    /// Per-request data store.
    pub store: Arc<DataStore<T>>,
    /// Page metadata.
    pub meta: Meta,
    /// Client bootstrap module, if any.
    pub bootstrap_modules: Option<String>,
    /// CSP nonce for inline scripts.
    pub nonce: Option<String>,
}

impl<T> Clone for RenderContext<T> {
    fn clone(&self) -> Self {
        Self {
            location: self.location.clone(),
            store: Arc::clone(&self.store),
            meta: self.meta.clone(),
            bootstrap_modules: self.bootstrap_modules.clone(),
            nonce: self.nonce.clone(),
        }
    }
}

impl<T> std::fmt::Debug for RenderContext<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("location", &self.location)
            .field("meta", &self.meta)
            .field("bootstrap_modules", &self.bootstrap_modules)
            .finish_non_exhaustive()
    }
}

/// Progress signals from an engine's streamed render.
///
/// Signals may arrive on any thread, in any number; implementations ignore
/// whatever arrives after the stream has settled.
pub trait StreamObserver: Send + Sync {
    /// The shell is complete and can be piped.
    fn shell_ready(&self);

    /// All structural rendering has finished.
    fn all_ready(&self);

    /// The shell could not be rendered.
    fn shell_error(&self, err: RenderError);

    /// An error surfaced while streaming after the shell.
    fn stream_error(&self, err: RenderError);
}

/// Handle to an engine's running stream.
pub trait EngineStream: Send + Sync {
    /// Start writing output to `sink`. Called at most once.
    fn pipe(&self, sink: Arc<dyn TransportSink>);

    /// Stop rendering. Must tolerate being called after completion.
    fn abort(&self);
}

/// A render engine.
pub trait RenderEngine<T>: Send + Sync {
    /// Render the page to a complete string.
    fn render_to_string(&self, ctx: &RenderContext<T>) -> Result<String, RenderError>;

    /// Start an incremental render. Errors returned here mean the engine
    /// never started.
    fn render_to_stream(
        &self,
        ctx: &RenderContext<T>,
        observer: Arc<dyn StreamObserver>,
    ) -> Result<Box<dyn EngineStream>, RenderError>;
}

impl<T, E> RenderEngine<T> for Arc<E>
where
    E: RenderEngine<T> + ?Sized,
{
    fn render_to_string(&self, ctx: &RenderContext<T>) -> Result<String, RenderError> {
        (**self).render_to_string(ctx)
    }

    fn render_to_stream(
        &self,
        ctx: &RenderContext<T>,
        observer: Arc<dyn StreamObserver>,
    ) -> Result<Box<dyn EngineStream>, RenderError> {
        (**self).render_to_stream(ctx, observer)
    }
}
