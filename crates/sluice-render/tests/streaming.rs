//! End-to-end scenarios for the streaming render path.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use sluice_core::{AbortController, AbortSignal, LifecyclePhase, Meta, RenderError};
use sluice_data::{DataError, DataSource};
use sluice_observability::{LogLevel, MemoryLogger};
use sluice_render::{
    EngineStream, HeadInput, RenderCallbacks, RenderContext, RenderEngine, RenderRequest,
    Renderer, StreamHandle, StreamObserver, StreamOptions, ViewEngine,
};
use sluice_streaming::{
    ChannelSink, DocumentShell, MemorySink, TransportEventKind, TransportSink,
};

#[derive(Debug, Clone, PartialEq)]
struct Page {
    title: String,
}

fn page(title: &str) -> Page {
    Page {
        title: title.to_string(),
    }
}

/// Engine whose progress signals are driven by the test.
#[derive(Default)]
struct ScriptedEngine {
    observer: Mutex<Option<Arc<dyn StreamObserver>>>,
    starts: AtomicUsize,
    pipes: Arc<AtomicUsize>,
    aborts: Arc<AtomicUsize>,
    fail_start: bool,
    shell_on_start: bool,
}

impl ScriptedEngine {
    fn observer(&self) -> Arc<dyn StreamObserver> {
        self.observer
            .lock()
            .unwrap()
            .clone()
            .expect("engine was never started")
    }
}

struct ScriptedStream {
    pipes: Arc<AtomicUsize>,
    aborts: Arc<AtomicUsize>,
}

impl EngineStream for ScriptedStream {
    fn pipe(&self, sink: Arc<dyn TransportSink>) {
        self.pipes.fetch_add(1, Ordering::SeqCst);
        sink.write("<div>shell</div>".into());
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

impl RenderEngine<Page> for ScriptedEngine {
    fn render_to_string(&self, _ctx: &RenderContext<Page>) -> Result<String, RenderError> {
        Ok(String::new())
    }

    fn render_to_stream(
        &self,
        _ctx: &RenderContext<Page>,
        observer: Arc<dyn StreamObserver>,
    ) -> Result<Box<dyn EngineStream>, RenderError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(RenderError::engine("engine exploded"));
        }
        if self.shell_on_start {
            observer.shell_ready();
        }
        *self.observer.lock().unwrap() = Some(observer);
        Ok(Box::new(ScriptedStream {
            pipes: self.pipes.clone(),
            aborts: self.aborts.clone(),
        }))
    }
}

/// Counts and records every caller callback.
#[derive(Default)]
struct Calls {
    heads: Mutex<Vec<String>>,
    shell_ready: AtomicUsize,
    all_ready: Mutex<Vec<Page>>,
    finish: Mutex<Vec<Page>>,
    errors: Mutex<Vec<String>>,
}

impl Calls {
    fn callbacks(self: &Arc<Self>) -> RenderCallbacks<Page> {
        let heads = self.clone();
        let shell = self.clone();
        let all_ready = self.clone();
        let finish = self.clone();
        let errors = self.clone();
        RenderCallbacks::new()
            .on_head(move |head| {
                heads.heads.lock().unwrap().push(head.to_string());
                Ok(())
            })
            .on_shell_ready(move || {
                shell.shell_ready.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .on_all_ready(move |page: &Page| all_ready.all_ready.lock().unwrap().push(page.clone()))
            .on_finish(move |page: &Page| finish.finish.lock().unwrap().push(page.clone()))
            .on_error(move |err| errors.errors.lock().unwrap().push(err.to_string()))
    }

    fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    fn finished(&self) -> Vec<Page> {
        self.finish.lock().unwrap().clone()
    }
}

struct Harness {
    renderer: Renderer<Page>,
    engine: Arc<ScriptedEngine>,
    logger: MemoryLogger,
    sink: Arc<MemorySink>,
    calls: Arc<Calls>,
}

impl Harness {
    fn new() -> Self {
        Self::with_engine(ScriptedEngine::default())
    }

    fn with_engine(engine: ScriptedEngine) -> Self {
        let engine = Arc::new(engine);
        let logger = MemoryLogger::new();
        let renderer = Renderer::new(engine.clone())
            .with_head(|input: &HeadInput<'_, Page>| {
                format!(
                    "<head>{}</head>",
                    input.data.map(|p| p.title.as_str()).unwrap_or("")
                )
            })
            .with_logger(Arc::new(logger.clone()));
        Self {
            renderer,
            engine,
            logger,
            sink: Arc::new(MemorySink::new()),
            calls: Arc::new(Calls::default()),
        }
    }

    fn stream(&self, request: RenderRequest<Page>, options: StreamOptions) -> StreamHandle {
        self.renderer.render_streaming(
            self.sink.clone(),
            self.calls.callbacks(),
            request,
            options,
        )
    }

    fn stream_value(&self, title: &str) -> StreamHandle {
        self.stream(
            RenderRequest::new("/home", DataSource::value(page(title))),
            StreamOptions::default(),
        )
    }
}

async fn settle(handle: &StreamHandle) -> Result<(), RenderError> {
    tokio::time::timeout(Duration::from_secs(2), handle.done())
        .await
        .expect("stream never settled")
}

async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition never held");
}

// === Happy Path Tests ===

#[tokio::test]
async fn test_blocking_happy_path() {
    let renderer = Renderer::new(ViewEngine::new(|_, data: Option<&Page>| {
        Ok(format!("<main>{}</main>", data.map(|p| p.title.as_str()).unwrap_or("")))
    }))
    .with_head(|input: &HeadInput<'_, Page>| {
        format!("<head>{}</head>", input.data.map(|p| p.title.as_str()).unwrap_or(""))
    })
    .with_logger(Arc::new(MemoryLogger::new()));

    let result = renderer
        .render_blocking(DataSource::value(page("T")), "/home", &Meta::new(), None)
        .await
        .unwrap();

    assert_eq!(result.head_content, "<head>T</head>");
    assert_eq!(result.app_html, "<main>T</main>");
    assert!(!result.aborted);
}

#[tokio::test]
async fn test_streaming_happy_path_with_view_engine() {
    let shell = DocumentShell::new();
    let renderer = Renderer::new(
        ViewEngine::new(|_, data: Option<&Page>| {
            Ok(match data {
                Some(page) => format!("<main>{}</main>", page.title),
                None => "<main>Loading</main>".to_string(),
            })
        })
        .with_trailer(shell.render_closing()),
    )
    .with_head(|input: &HeadInput<'_, Page>| {
        format!("<title>{}</title>", input.data.map(|p| p.title.as_str()).unwrap_or("..."))
    })
    .with_logger(Arc::new(MemoryLogger::new()));

    let sink = Arc::new(MemorySink::new());
    let calls = Arc::new(Calls::default());
    let head_sink = sink.clone();
    let callbacks = calls.callbacks().on_head(move |head| {
        head_sink.write(shell.render_opening(head).into());
        Ok(())
    });
    let data = DataSource::future(async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(page("Streamed"))
    });

    let handle = renderer.render_streaming(
        sink.clone(),
        callbacks,
        RenderRequest::new("/stream", data)
            .with_bootstrap_modules("/static/entry.js")
            .with_nonce("n0nce"),
        StreamOptions::default(),
    );
    settle(&handle).await.unwrap();

    let body = sink.body_string();
    assert!(body.starts_with("<!DOCTYPE html>"));
    assert!(body.contains("<title>...</title>"));
    assert!(body.contains(r#"<script type="module" src="/static/entry.js" nonce="n0nce"></script>"#));
    assert!(body.contains("<main>Loading</main>"));
    assert!(body.contains("<main>Streamed</main>"));
    assert!(body.ends_with("</html>"));
    assert!(sink.writable_ended());
    assert_eq!(sink.destroy_calls(), 0);

    assert_eq!(calls.finished(), vec![page("Streamed")]);
    assert!(calls.errors().is_empty());
    assert_eq!(handle.phase(), LifecyclePhase::Completion);
    assert!(handle.timing().time_to_shell().is_some());
    assert!(handle.timing().time_to_all_ready().is_some());
}

#[tokio::test]
async fn test_shell_ready_pipes_and_reports_head() {
    let h = Harness::new();
    let handle = h.stream_value("T");

    h.engine.observer().shell_ready();

    assert_eq!(h.engine.pipes.load(Ordering::SeqCst), 1);
    assert_eq!(h.sink.body_string(), "<div>shell</div>");
    assert_eq!(*h.calls.heads.lock().unwrap(), vec!["<head>T</head>".to_string()]);
    assert_eq!(h.calls.shell_ready.load(Ordering::SeqCst), 1);
    assert_eq!(handle.phase(), LifecyclePhase::ShellReady);

    h.engine.observer().all_ready();
    assert_eq!(h.calls.finished(), vec![page("T")]);
    assert_eq!(handle.phase(), LifecyclePhase::AllReady);

    h.sink.end();
    settle(&handle).await.unwrap();
    assert_eq!(handle.phase(), LifecyclePhase::Completion);
    assert!(h.logger.contains(LogLevel::Info, "Stream finished (normal completion)"));
}

#[tokio::test]
async fn test_repeated_shell_ready_pipes_once() {
    let h = Harness::new();
    let _handle = h.stream_value("T");

    let observer = h.engine.observer();
    observer.shell_ready();
    observer.shell_ready();

    assert_eq!(h.engine.pipes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shell_ready_during_engine_start_pipes_after_handle() {
    let h = Harness::with_engine(ScriptedEngine {
        shell_on_start: true,
        ..ScriptedEngine::default()
    });
    let _handle = h.stream_value("T");

    assert_eq!(h.engine.pipes.load(Ordering::SeqCst), 1);
    assert_eq!(h.calls.heads.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_head_reflects_unresolved_data() {
    let h = Harness::new();
    let data = DataSource::future(async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(page("Late"))
    });
    let handle = h.stream(RenderRequest::new("/home", data), StreamOptions::default());

    h.engine.observer().shell_ready();

    assert_eq!(*h.calls.heads.lock().unwrap(), vec!["<head></head>".to_string()]);
    assert_eq!(h.engine.pipes.load(Ordering::SeqCst), 1);
    handle.abort();
}

// === Timeout Tests ===

#[tokio::test]
async fn test_shell_timeout_fails_stream() {
    let h = Harness::new();
    let handle = h.stream(
        RenderRequest::new("/home", DataSource::value(page("T"))),
        StreamOptions::new().with_shell_timeout(Duration::from_millis(5)),
    );

    let err = settle(&handle).await.unwrap_err();

    assert!(err.is_shell_timeout());
    assert!(err.to_string().contains("Shell not ready after 5ms"));
    assert_eq!(h.calls.errors(), vec![err.to_string()]);
    assert_eq!(h.engine.aborts.load(Ordering::SeqCst), 1);
    assert_eq!(h.sink.destroy_calls(), 1);
    assert!(matches!(handle.phase(), LifecyclePhase::Error(_)));
}

#[tokio::test]
async fn test_shell_ready_cancels_timer() {
    let h = Harness::new();
    let handle = h.stream(
        RenderRequest::new("/home", DataSource::value(page("T"))),
        StreamOptions::new().with_shell_timeout(Duration::from_millis(20)),
    );

    h.engine.observer().shell_ready();
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(!handle.is_settled());
    assert!(h.calls.errors().is_empty());
    handle.abort();
}

#[tokio::test]
async fn test_renderer_default_timeout_applies() {
    let h = Harness::new();
    let renderer = h.renderer.clone().with_shell_timeout(Duration::from_millis(5));

    let handle = renderer.render_streaming(
        h.sink.clone(),
        h.calls.callbacks(),
        RenderRequest::new("/home", DataSource::value(page("T"))),
        StreamOptions::default(),
    );

    let err = settle(&handle).await.unwrap_err();
    assert!(err.to_string().contains("Shell not ready after 5ms"));
}

// === Transport Tests ===

#[tokio::test]
async fn test_benign_disconnect_mid_stream() {
    let h = Harness::new();
    let handle = h.stream_value("T");
    h.engine.observer().shell_ready();

    h.sink.emit_error(io::Error::other("ECONNRESET"));

    settle(&handle).await.unwrap();
    assert!(h.calls.errors().is_empty());
    assert!(matches!(handle.phase(), LifecyclePhase::Cancelled(_)));
    assert!(h.logger.contains(LogLevel::Warn, "Client disconnected during stream"));
    assert_eq!(h.engine.aborts.load(Ordering::SeqCst), 1);
    assert!(!h.logger.contains(LogLevel::Debug, "Cleanup step failed"));
}

#[tokio::test]
async fn test_fatal_stream_error() {
    let h = Harness::new();
    let handle = h.stream_value("T");
    h.engine.observer().shell_ready();

    h.sink.emit_error(io::Error::other("disk full"));

    let err = settle(&handle).await.unwrap_err();
    assert_eq!(err.to_string(), "disk full");
    assert_eq!(h.calls.errors(), vec!["disk full".to_string()]);
    assert!(h.logger.contains(LogLevel::Error, "disk full"));
}

#[tokio::test]
async fn test_sink_close_is_benign() {
    let h = Harness::new();
    let handle = h.stream_value("T");

    h.sink.emit_close();

    settle(&handle).await.unwrap();
    assert!(h.calls.errors().is_empty());
    // Listeners are gone after teardown.
    assert_eq!(h.sink.listener_count(TransportEventKind::Error), 0);
    assert_eq!(h.sink.listener_count(TransportEventKind::Finish), 0);
}

#[tokio::test]
async fn test_dropped_channel_receiver_is_benign() {
    let renderer = Renderer::new(ViewEngine::new(|_, _: Option<&Page>| Ok("<p>hi</p>".to_string())))
        .with_logger(Arc::new(MemoryLogger::new()));
    let (sink, rx) = ChannelSink::new();
    drop(rx);
    let calls = Arc::new(Calls::default());

    let handle = renderer.render_streaming(
        Arc::new(sink),
        calls.callbacks(),
        RenderRequest::new("/gone", DataSource::value(page("T"))),
        StreamOptions::default(),
    );

    settle(&handle).await.unwrap();
    assert!(calls.errors().is_empty());
    assert!(matches!(handle.phase(), LifecyclePhase::Cancelled(_)));
}

#[tokio::test]
async fn test_channel_sink_receives_document() {
    let renderer = Renderer::new(ViewEngine::new(|_, data: Option<&Page>| {
        Ok(format!("<h1>{}</h1>", data.map(|p| p.title.as_str()).unwrap_or("")))
    }))
    .with_logger(Arc::new(MemoryLogger::new()));
    let (sink, mut rx) = ChannelSink::new();

    let handle = renderer.render_streaming(
        Arc::new(sink),
        RenderCallbacks::new(),
        RenderRequest::new("/", DataSource::value(page("Hello"))),
        StreamOptions::default(),
    );
    settle(&handle).await.unwrap();

    let mut body = Vec::new();
    while let Some(chunk) = rx.recv().await {
        body.extend_from_slice(&chunk);
    }
    assert_eq!(String::from_utf8(body).unwrap(), "<h1>Hello</h1>");
}

// === Engine Signal Tests ===

#[tokio::test]
async fn test_shell_error_is_fatal() {
    let h = Harness::new();
    let handle = h.stream(
        RenderRequest::new("/home", DataSource::value(page("T"))),
        StreamOptions::new().with_shell_timeout(Duration::from_millis(20)),
    );

    h.engine.observer().shell_error(RenderError::engine("template missing"));

    let err = settle(&handle).await.unwrap_err();
    assert_eq!(err.to_string(), "template missing");
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(h.calls.errors(), vec!["template missing".to_string()]);
    assert_eq!(h.engine.pipes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_benign_stream_error() {
    let h = Harness::new();
    let handle = h.stream_value("T");
    let observer = h.engine.observer();
    observer.shell_ready();

    observer.stream_error(io::Error::new(io::ErrorKind::BrokenPipe, "write failed").into());

    settle(&handle).await.unwrap();
    assert!(h.calls.errors().is_empty());
    assert!(h.logger.contains(LogLevel::Warn, "/home"));
}

#[tokio::test]
async fn test_fatal_stream_error_from_engine() {
    let h = Harness::new();
    let handle = h.stream_value("T");
    let observer = h.engine.observer();
    observer.shell_ready();

    observer.stream_error(RenderError::engine("boom"));

    assert_eq!(settle(&handle).await.unwrap_err().to_string(), "boom");
    assert_eq!(h.calls.errors(), vec!["boom".to_string()]);
}

#[tokio::test]
async fn test_engine_start_failure() {
    let h = Harness::with_engine(ScriptedEngine {
        fail_start: true,
        ..ScriptedEngine::default()
    });
    let handle = h.stream_value("T");

    let err = settle(&handle).await.unwrap_err();
    assert_eq!(err.to_string(), "engine exploded");
    assert_eq!(h.calls.errors(), vec!["engine exploded".to_string()]);
    assert!(h.logger.contains(LogLevel::Error, "Render engine failed to start"));
}

#[tokio::test]
async fn test_signals_after_settle_are_ignored() {
    let h = Harness::new();
    let handle = h.stream_value("T");
    handle.abort();
    settle(&handle).await.unwrap();

    let observer = h.engine.observer();
    observer.shell_ready();
    observer.all_ready();
    observer.stream_error(RenderError::engine("late"));

    assert_eq!(h.engine.pipes.load(Ordering::SeqCst), 0);
    assert!(h.calls.heads.lock().unwrap().is_empty());
    assert!(h.calls.finished().is_empty());
    assert!(h.calls.errors().is_empty());
}

// === Callback Isolation Tests ===

#[tokio::test]
async fn test_failing_head_callback_only_warns() {
    let h = Harness::new();
    let callbacks = RenderCallbacks::new()
        .on_head(|_| anyhow::bail!("head rejected"))
        .on_shell_ready(|| anyhow::bail!("shell hook rejected"));

    let handle = h.renderer.render_streaming(
        h.sink.clone(),
        callbacks,
        RenderRequest::new("/home", DataSource::value(page("T"))),
        StreamOptions::default(),
    );
    h.engine.observer().shell_ready();

    assert!(!handle.is_settled());
    assert_eq!(h.engine.pipes.load(Ordering::SeqCst), 1);
    assert!(h.logger.contains(LogLevel::Warn, "onHead callback failed: head rejected"));
    assert!(h.logger.contains(LogLevel::Warn, "onShellReady callback failed"));
    handle.abort();
}

// === Data Delivery Tests ===

#[tokio::test]
async fn test_all_ready_retries_pending_data() {
    let h = Harness::new();
    let data = DataSource::future(async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(page("Slow"))
    });
    let handle = h.stream(RenderRequest::new("/home", data), StreamOptions::default());
    let observer = h.engine.observer();
    observer.shell_ready();

    observer.all_ready();
    assert!(h.calls.finished().is_empty());

    let calls = h.calls.clone();
    eventually(move || !calls.finished().is_empty()).await;
    h.sink.end();
    settle(&handle).await.unwrap();

    assert_eq!(*h.calls.all_ready.lock().unwrap(), vec![page("Slow")]);
    assert_eq!(h.calls.finished(), vec![page("Slow")]);
    assert!(h.calls.errors().is_empty());
}

#[tokio::test]
async fn test_all_ready_from_engine_thread_retries_pending_data() {
    let h = Harness::new();
    let data = DataSource::future(async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(page("Threaded"))
    });
    let handle = h.stream(RenderRequest::new("/home", data), StreamOptions::default());
    let observer = h.engine.observer();

    std::thread::spawn(move || {
        observer.shell_ready();
        observer.all_ready();
    })
    .join()
    .unwrap();

    let calls = h.calls.clone();
    eventually(move || !calls.finished().is_empty()).await;
    h.sink.end();
    settle(&handle).await.unwrap();

    assert_eq!(h.calls.finished(), vec![page("Threaded")]);
    assert!(h.calls.errors().is_empty());
}

#[tokio::test]
async fn test_pending_data_rejection_is_fatal() {
    let h = Harness::new();
    let data = DataSource::future(async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Err(DataError::failed("db down"))
    });
    let handle = h.stream(RenderRequest::new("/home", data), StreamOptions::default());
    let observer = h.engine.observer();
    observer.shell_ready();
    observer.all_ready();

    let err = settle(&handle).await.unwrap_err();
    assert!(matches!(err, RenderError::Data(_)));
    assert_eq!(h.calls.errors(), vec!["db down".to_string()]);
    assert!(h.logger.contains(LogLevel::Error, "Data promise rejected"));
    assert!(h.calls.finished().is_empty());
}

#[tokio::test]
async fn test_failed_data_on_delivery_is_fatal() {
    let h = Harness::new();
    let data = DataSource::future(async { Err(DataError::failed("bad payload")) });
    let handle = h.stream(RenderRequest::new("/home", data), StreamOptions::default());
    let observer = h.engine.observer();
    observer.shell_ready();
    observer.all_ready();

    let err = settle(&handle).await.unwrap_err();
    assert_eq!(err.to_string(), "bad payload");
    assert_eq!(h.calls.errors().len(), 1);

    // A second delivery sees the cached failure but the stream is settled.
    observer.all_ready();
    assert_eq!(h.calls.errors().len(), 1);
}

// === Cancellation Tests ===

#[tokio::test]
async fn test_cancel_before_start_skips_engine() {
    let h = Harness::new();
    let signal = AbortSignal::aborted("client left");

    let handle = h.stream(
        RenderRequest::new("/home", DataSource::value(page("T"))).with_signal(signal),
        StreamOptions::default(),
    );

    settle(&handle).await.unwrap();
    assert_eq!(h.engine.starts.load(Ordering::SeqCst), 0);
    assert!(h.calls.errors().is_empty());
    assert!(!handle.abort());
    assert!(h.logger.contains(LogLevel::Warn, "before stream start"));
}

#[tokio::test]
async fn test_signal_abort_mid_stream_is_benign() {
    let h = Harness::new();
    let controller = AbortController::new();
    let handle = h.stream(
        RenderRequest::new("/home", DataSource::value(page("T"))).with_signal(controller.signal()),
        StreamOptions::default(),
    );
    h.engine.observer().shell_ready();
    assert_eq!(controller.signal().listener_count(), 1);

    controller.abort("client navigated away");

    settle(&handle).await.unwrap();
    assert!(h.calls.errors().is_empty());
    assert_eq!(controller.signal().listener_count(), 0);
    assert!(h.logger.contains(LogLevel::Warn, "client navigated away"));
    assert_eq!(h.engine.aborts.load(Ordering::SeqCst), 1);
    assert_eq!(h.sink.destroy_calls(), 1);
}

#[tokio::test]
async fn test_completion_removes_signal_listener() {
    let h = Harness::new();
    let controller = AbortController::new();
    let handle = h.stream(
        RenderRequest::new("/home", DataSource::value(page("T"))).with_signal(controller.signal()),
        StreamOptions::default(),
    );

    h.engine.observer().shell_ready();
    h.sink.end();
    settle(&handle).await.unwrap();

    assert_eq!(controller.signal().listener_count(), 0);
    assert!(controller.abort("too late"));
    assert_eq!(handle.phase(), LifecyclePhase::Completion);
}

#[tokio::test]
async fn test_manual_abort_is_idempotent() {
    let h = Harness::new();
    let handle = h.stream_value("T");

    assert!(handle.abort());
    assert!(!handle.abort());
    h.sink.emit_error(io::Error::other("disk full"));

    settle(&handle).await.unwrap();
    assert_eq!(h.sink.destroy_calls(), 1);
    assert_eq!(h.engine.aborts.load(Ordering::SeqCst), 1);
    assert!(h.calls.errors().is_empty());
    assert!(h.logger.contains(LogLevel::Warn, "Manual abort for location: /home"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_aborts_settle_once() {
    let h = Harness::new();
    let controller = AbortController::new();
    let handle = h.stream(
        RenderRequest::new("/home", DataSource::value(page("T"))).with_signal(controller.signal()),
        StreamOptions::new().with_shell_timeout(Duration::from_millis(1)),
    );
    let observer = h.engine.observer();
    let barrier = Arc::new(Barrier::new(6));

    let racers: Vec<_> = (0..6)
        .map(|i| {
            let handle = handle.clone();
            let controller = controller.clone();
            let sink = h.sink.clone();
            let observer = observer.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                match i {
                    0 => {
                        handle.abort();
                    }
                    1 => {
                        controller.abort("racing");
                    }
                    2 => {
                        sink.emit_error(io::Error::other("disk full"));
                    }
                    3 => observer.shell_error(RenderError::engine("template missing")),
                    4 => observer.stream_error(RenderError::engine("render panicked")),
                    _ => {
                        sink.emit_close();
                    }
                }
            })
        })
        .collect();
    for racer in racers {
        racer.join().unwrap();
    }

    let outcome = settle(&handle).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    match outcome {
        Ok(()) => assert!(h.calls.errors().is_empty()),
        Err(err) => assert_eq!(h.calls.errors(), vec![err.to_string()]),
    }
    assert_eq!(h.sink.destroy_calls(), 1);
    assert_eq!(h.engine.aborts.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_fatal_errors_notify_once() {
    let h = Harness::new();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = errors.clone();
    let callbacks = RenderCallbacks::new().on_error(move |err: &RenderError| {
        std::thread::sleep(Duration::from_millis(50));
        seen.lock().unwrap().push(err.to_string());
    });
    let handle = h.renderer.render_streaming(
        h.sink.clone(),
        callbacks,
        RenderRequest::new("/home", DataSource::value(page("T"))),
        StreamOptions::default(),
    );
    let observer = h.engine.observer();

    let engine_side = std::thread::spawn(move || {
        observer.shell_error(RenderError::engine("template missing"))
    });
    std::thread::sleep(Duration::from_millis(5));
    let sink = h.sink.clone();
    let transport_side = std::thread::spawn(move || {
        sink.emit_error(io::Error::other("disk full"));
    });
    engine_side.join().unwrap();
    transport_side.join().unwrap();

    let err = settle(&handle).await.unwrap_err();
    assert_eq!(err.to_string(), "template missing");
    assert_eq!(*errors.lock().unwrap(), vec!["template missing".to_string()]);
}
