//! Per-request render input.

use sluice_core::{AbortSignal, Meta, RequestId};
use sluice_data::DataSource;

/// One render request.
///
/// # Example
///
/// ```rust,ignore
/// let request = RenderRequest::new("/product/42", DataSource::future(fetch_product(42)))
///     .with_meta(meta_from([("title", "Product 42")]))
///     .with_bootstrap_modules("/static/entry.js")
///     .with_signal(controller.signal());
/// ```
#[derive(Debug)]
pub struct RenderRequest<T> {
    /// Request identifier carried into every log entry.
    pub request_id: RequestId,
    /// Request path.
    pub location: String,
    /// Initial data.
    pub data: DataSource<T>,
    /// Page metadata.
    pub meta: Meta,
    /// Client bootstrap module.
    pub bootstrap_modules: Option<String>,
    /// CSP nonce for emitted scripts.
    pub csp_nonce: Option<String>,
    /// External cancellation.
    pub signal: Option<AbortSignal>,
}

impl<T> RenderRequest<T> {
    /// Create a request with a generated id and empty metadata.
    pub fn new(location: impl Into<String>, data: DataSource<T>) -> Self {
        Self {
            request_id: RequestId::generate(),
            location: location.into(),
            data,
            meta: Meta::new(),
            bootstrap_modules: None,
            csp_nonce: None,
            signal: None,
        }
    }

    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = id;
        self
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_bootstrap_modules(mut self, src: impl Into<String>) -> Self {
        self.bootstrap_modules = Some(src.into());
        self
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.csp_nonce = Some(nonce.into());
        self
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}
