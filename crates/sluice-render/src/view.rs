//! Built-in engine rendering a view function.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use sluice_core::RenderError;
use sluice_data::Snapshot;
use sluice_streaming::{escape_html, TransportSink};
use tokio::task::JoinHandle;

use crate::engine::{EngineStream, RenderContext, RenderEngine, StreamObserver};

/// Id of the element the resolved markup is swapped into.
pub const ROOT_ID: &str = "root";

type ViewFn<T> =
    Arc<dyn Fn(&RenderContext<T>, Option<&T>) -> Result<String, RenderError> + Send + Sync>;

/// Engine that renders pages with a plain view function.
///
/// The view is called with `None` while data is still loading and with the
/// resolved value afterwards. When streaming, the loading markup is the
/// shell; the resolved markup follows in a hidden element together with a
/// script that moves it into the root element.
pub struct ViewEngine<T> {
    view: ViewFn<T>,
    trailer: Option<String>,
}

impl<T> ViewEngine<T>
where
    T: Send + Sync + 'static,
{
    pub fn new<F>(view: F) -> Self
    where
        F: Fn(&RenderContext<T>, Option<&T>) -> Result<String, RenderError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            view: Arc::new(view),
            trailer: None,
        }
    }

    /// Markup written after the page and before the sink is ended, such as
    /// the closing half of a document frame.
    pub fn with_trailer(mut self, trailer: impl Into<String>) -> Self {
        self.trailer = Some(trailer.into());
        self
    }
}

impl<T> RenderEngine<T> for ViewEngine<T>
where
    T: Send + Sync + 'static,
{
    fn render_to_string(&self, ctx: &RenderContext<T>) -> Result<String, RenderError> {
        match ctx.store.snapshot() {
            Snapshot::Ready(data) => (self.view)(ctx, Some(&data)),
            Snapshot::Pending(_) => Err(RenderError::engine(format!(
                "Data not resolved for location: {}",
                ctx.location
            ))),
            Snapshot::Failed(err) => Err(err.into()),
        }
    }

    fn render_to_stream(
        &self,
        ctx: &RenderContext<T>,
        observer: Arc<dyn StreamObserver>,
    ) -> Result<Box<dyn EngineStream>, RenderError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| RenderError::engine(format!("No async runtime: {}", e)))?;

        let output = Arc::new(ViewOutput::new(self.trailer.clone()));
        let task = runtime.spawn(run_view(
            self.view.clone(),
            ctx.clone(),
            observer,
            output.clone(),
        ));
        *output.task() = Some(task);

        Ok(Box::new(ViewStream { output }))
    }
}

async fn run_view<T>(
    view: ViewFn<T>,
    ctx: RenderContext<T>,
    observer: Arc<dyn StreamObserver>,
    output: Arc<ViewOutput>,
) where
    T: Send + Sync + 'static,
{
    let initial = ctx.store.snapshot().ready().cloned();
    let shell = match view(&ctx, initial.as_deref()) {
        Ok(html) => html,
        Err(err) => {
            observer.shell_error(err);
            return;
        }
    };
    output.write(Bytes::from(shell));
    observer.shell_ready();

    if initial.is_none() {
        let data = match ctx.store.resolve().await {
            Ok(data) => data,
            Err(err) => {
                observer.stream_error(err.into());
                return;
            }
        };
        match view(&ctx, Some(&data)) {
            Ok(html) => output.write(Bytes::from(resolved_chunk(&html, ctx.nonce.as_deref()))),
            Err(err) => {
                observer.stream_error(err);
                return;
            }
        }
    }

    observer.all_ready();
    output.finish();
}

/// Markup replacing the root element's content with `html`.
fn resolved_chunk(html: &str, nonce: Option<&str>) -> String {
    let nonce = nonce
        .map(|n| format!(r#" nonce="{}""#, escape_html(n)))
        .unwrap_or_default();
    format!(
        concat!(
            r#"<div hidden id="sluice-resolved">{html}</div>"#,
            r#"<script{nonce}>(function(){{"#,
            r#"var s=document.getElementById("sluice-resolved"),r=document.getElementById("{root}");"#,
            r#"if(s&&r){{r.innerHTML=s.innerHTML;}}"#,
            r#"}})();</script>"#
        ),
        html = html,
        nonce = nonce,
        root = ROOT_ID
    )
}

#[derive(Default)]
struct Pipe {
    sink: Option<Arc<dyn TransportSink>>,
    buffered: Vec<Bytes>,
    finished: bool,
}

/// Output shared by the render task and its handle.
///
/// Chunks written before the stream is piped are held back and flushed in
/// order when it is.
struct ViewOutput {
    pipe: Mutex<Pipe>,
    task: Mutex<Option<JoinHandle<()>>>,
    aborted: AtomicBool,
    trailer: Option<String>,
}

impl ViewOutput {
    fn new(trailer: Option<String>) -> Self {
        Self {
            pipe: Mutex::new(Pipe::default()),
            task: Mutex::new(None),
            aborted: AtomicBool::new(false),
            trailer,
        }
    }

    fn pipe(&self) -> MutexGuard<'_, Pipe> {
        self.pipe.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, chunk: Bytes) {
        if self.aborted.load(Ordering::Acquire) {
            return;
        }
        let mut guard = self.pipe();
        let pipe = &mut *guard;
        match &pipe.sink {
            Some(sink) => {
                sink.write(chunk);
            }
            None => pipe.buffered.push(chunk),
        }
    }

    fn finish(&self) {
        if let Some(trailer) = &self.trailer {
            self.write(Bytes::from(trailer.clone()));
        }
        if self.aborted.load(Ordering::Acquire) {
            return;
        }
        let mut pipe = self.pipe();
        pipe.finished = true;
        if let Some(sink) = &pipe.sink {
            sink.end();
        }
    }

    fn attach(&self, sink: Arc<dyn TransportSink>) {
        let mut pipe = self.pipe();
        for chunk in std::mem::take(&mut pipe.buffered) {
            sink.write(chunk);
        }
        if pipe.finished {
            sink.end();
        }
        pipe.sink = Some(sink);
    }
}

struct ViewStream {
    output: Arc<ViewOutput>,
}

impl EngineStream for ViewStream {
    fn pipe(&self, sink: Arc<dyn TransportSink>) {
        self.output.attach(sink);
    }

    fn abort(&self) {
        self.output.aborted.store(true, Ordering::Release);
        if let Some(task) = self.output.task().take() {
            task.abort();
        }
    }
}
