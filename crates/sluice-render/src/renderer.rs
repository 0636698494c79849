//! Renderer facade and the blocking render path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sluice_core::{AbortSignal, ConfigError, Meta, RenderError, RequestId};
use sluice_data::{DataSource, DataStore};
use sluice_observability::{RenderLogger, StructuredLogger};
use sluice_streaming::{bootstrap_script, BenignPattern, HeadContent};
use tokio::sync::Notify;

use crate::config::RendererConfig;
use crate::engine::{RenderContext, RenderEngine};
use crate::request::RenderRequest;

/// Input to a head function.
#[derive(Debug)]
pub struct HeadInput<'a, T> {
    /// Resolved data, or `None` while it is still loading.
    pub data: Option<&'a T>,
    pub meta: &'a Meta,
    pub location: &'a str,
}

/// Computes the head fragment for a page.
pub type HeadFn<T> = Arc<dyn Fn(&HeadInput<'_, T>) -> String + Send + Sync>;

/// Head renderer bound to one request.
pub(crate) type BoundHead<T> = Box<dyn Fn(Option<&T>) -> String + Send + Sync>;

/// Result of a blocking render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockingRender {
    pub head_content: String,
    pub app_html: String,
    /// The request was cancelled; both strings are empty.
    pub aborted: bool,
}

impl BlockingRender {
    /// The result returned for a cancelled request.
    pub fn aborted() -> Self {
        Self {
            aborted: true,
            ..Self::default()
        }
    }
}

/// Renders pages through a [`RenderEngine`], either to completion or as a
/// guarded stream.
///
/// # Example
///
/// ```rust,ignore
/// let renderer = Renderer::new(ViewEngine::new(|_, data: Option<&Page>| {
///     Ok(match data {
///         Some(page) => format!("<h1>{}</h1>", page.title),
///         None => "<p>Loading</p>".to_string(),
///     })
/// }))
/// .with_head(|input| format!("<title>{}</title>", input.meta["title"]));
///
/// let page = renderer
///     .render_blocking(DataSource::value(page), "/home", &meta, None)
///     .await?;
/// ```
pub struct Renderer<T> {
    pub(crate) engine: Arc<dyn RenderEngine<T>>,
    pub(crate) head: Option<HeadFn<T>>,
    pub(crate) config: RendererConfig,
    pub(crate) benign: BenignPattern,
    pub(crate) logger: Option<Arc<dyn RenderLogger>>,
}

impl<T> Clone for Renderer<T> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            head: self.head.clone(),
            config: self.config.clone(),
            benign: self.benign.clone(),
            logger: self.logger.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Renderer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("config", &self.config)
            .field("benign_pattern", &self.benign.as_str())
            .field("custom_head", &self.head.is_some())
            .field("custom_logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

impl<T> Renderer<T>
where
    T: Send + Sync + 'static,
{
    /// Create a renderer with the default configuration.
    pub fn new<E>(engine: E) -> Self
    where
        E: RenderEngine<T> + 'static,
    {
        Self {
            engine: Arc::new(engine),
            head: None,
            config: RendererConfig::default(),
            benign: BenignPattern::default(),
            logger: None,
        }
    }

    /// Apply a configuration, compiling its benign-error pattern.
    pub fn with_config(mut self, config: RendererConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.benign = config.benign_pattern()?;
        self.config = config;
        Ok(self)
    }

    /// Replace the default head function.
    ///
    /// The default builds the head from page metadata, falling back to the
    /// app name for the title.
    pub fn with_head<F>(mut self, head: F) -> Self
    where
        F: Fn(&HeadInput<'_, T>) -> String + Send + Sync + 'static,
    {
        self.head = Some(Arc::new(head));
        self
    }

    /// Log through `logger` instead of a per-request [`StructuredLogger`].
    pub fn with_logger(mut self, logger: Arc<dyn RenderLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set the default shell budget.
    pub fn with_shell_timeout(mut self, timeout: Duration) -> Self {
        self.config.shell_timeout_ms = timeout.as_millis().max(1) as u64;
        self
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Render a page to completion.
    ///
    /// A signal that is already aborted skips rendering. A signal that fires
    /// while data is resolving discards whatever was produced. Either way the
    /// aborted result is returned rather than an error.
    pub async fn render_blocking(
        &self,
        data: DataSource<T>,
        location: &str,
        meta: &Meta,
        signal: Option<&AbortSignal>,
    ) -> Result<BlockingRender, RenderError> {
        let mut request = RenderRequest::new(location, data).with_meta(meta.clone());
        request.signal = signal.cloned();
        self.render_request(request).await
    }

    /// Render a [`RenderRequest`] to completion.
    pub async fn render_request(
        &self,
        request: RenderRequest<T>,
    ) -> Result<BlockingRender, RenderError> {
        let RenderRequest {
            request_id,
            location,
            data,
            meta,
            bootstrap_modules,
            csp_nonce,
            signal,
        } = request;
        let logger = self.logger_for(&request_id, &location);

        if signal.as_ref().is_some_and(AbortSignal::is_aborted) {
            logger.warn(&format!(
                "Render aborted before start for location: {}",
                location
            ));
            return Ok(BlockingRender::aborted());
        }

        let flagged = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let listener = signal.as_ref().and_then(|signal| {
            let flagged = flagged.clone();
            let wake = wake.clone();
            signal.add_listener(move |_| {
                flagged.store(true, Ordering::Release);
                wake.notify_one();
            })
        });

        let store = Arc::new(DataStore::new(data));
        let ctx = RenderContext {
            location: location.clone(),
            store: store.clone(),
            meta: meta.clone(),
            bootstrap_modules,
            nonce: csp_nonce,
        };
        let work = async {
            let value = store.resolve().await?;
            let head_content = self.render_head(Some(&value), &meta, &location);
            let app_html = self.engine.render_to_string(&ctx)?;
            Ok::<_, RenderError>(BlockingRender {
                head_content,
                app_html,
                aborted: false,
            })
        };

        let outcome = tokio::select! {
            result = work => Some(result),
            _ = wake.notified() => None,
        };

        if let (Some(signal), Some(id)) = (&signal, listener) {
            // Fired listeners are already gone.
            signal.remove_listener(id).ok();
        }

        let aborted = flagged.load(Ordering::Acquire)
            || signal.as_ref().is_some_and(AbortSignal::is_aborted);
        match outcome {
            Some(result) if !aborted => result,
            _ => {
                logger.warn(&format!(
                    "Render aborted during render for location: {}",
                    location
                ));
                Ok(BlockingRender::aborted())
            }
        }
    }

    pub(crate) fn logger_for(&self, request_id: &RequestId, location: &str) -> Arc<dyn RenderLogger> {
        match &self.logger {
            Some(logger) => logger.clone(),
            None => Arc::new(
                StructuredLogger::new(request_id.clone())
                    .with_location(location)
                    .with_format(self.config.log_format)
                    .with_min_level(self.config.log_level),
            ),
        }
    }

    fn render_head(&self, data: Option<&T>, meta: &Meta, location: &str) -> String {
        compute_head(self.head.as_ref(), &self.config.app_name, data, meta, location)
    }

    /// Head renderer for one streamed request, with the bootstrap script
    /// appended when a module is given.
    pub(crate) fn bind_head(
        &self,
        meta: Meta,
        location: String,
        bootstrap_modules: Option<String>,
        nonce: Option<String>,
    ) -> BoundHead<T> {
        let head = self.head.clone();
        let app_name = self.config.app_name.clone();
        Box::new(move |data| {
            let mut fragment = compute_head(head.as_ref(), &app_name, data, &meta, &location);
            if let Some(src) = &bootstrap_modules {
                fragment.push_str(&bootstrap_script(src, nonce.as_deref()));
            }
            fragment
        })
    }
}

fn compute_head<T>(
    head: Option<&HeadFn<T>>,
    app_name: &str,
    data: Option<&T>,
    meta: &Meta,
    location: &str,
) -> String {
    match head {
        Some(head) => head(&HeadInput {
            data,
            meta,
            location,
        }),
        None => {
            let mut content = HeadContent::from_meta(meta);
            if content.title.is_none() {
                content.title = Some(app_name.to_string());
            }
            content.render()
        }
    }
}
