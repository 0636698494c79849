//! Streaming render path.
//!
//! One call wires four event sources into a [`StreamController`]: the
//! caller's abort signal, transport events on the sink, the shell timer and
//! the engine's progress signals. Whichever settles the controller first
//! decides the outcome; everything after is ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use sluice_core::{LifecyclePhase, RenderError, TimingContext};
use sluice_data::{DataStore, Snapshot};
use sluice_observability::LogLevel;
use sluice_streaming::{
    BenignPattern, Done, GuardCallbacks, ShellTimer, StreamController, TransportGuards,
    TransportSink, CLIENT_DISCONNECTED, STREAM_FINISHED,
};
use tokio::runtime::Handle;

use crate::callbacks::{Callbacks, RenderCallbacks};
use crate::config::StreamOptions;
use crate::engine::{EngineStream, RenderContext, StreamObserver};
use crate::renderer::{BoundHead, Renderer};
use crate::request::RenderRequest;

/// Handle to a running streamed render.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    controller: StreamController,
    location: String,
}

impl StreamHandle {
    /// Cancel the stream as a benign abort. No-op once settled.
    pub fn abort(&self) -> bool {
        self.controller.benign_abort(&format!(
            "Manual abort for location: {}",
            self.location
        ))
    }

    /// Resolves on completion or cancellation; rejects with the error that
    /// failed the stream.
    pub fn done(&self) -> Done {
        self.controller.done()
    }

    pub fn is_settled(&self) -> bool {
        self.controller.is_aborted()
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.controller.phase()
    }

    /// Timing marks recorded so far.
    pub fn timing(&self) -> TimingContext {
        self.controller.timing()
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn controller(&self) -> &StreamController {
        &self.controller
    }
}

impl<T> Renderer<T>
where
    T: Send + Sync + 'static,
{
    /// Stream a page into `sink`.
    ///
    /// Errors never return from this call; they settle the handle's `done`
    /// and reach `on_error`. Must be called inside a Tokio runtime; the
    /// engine may signal from any thread afterwards.
    pub fn render_streaming(
        &self,
        sink: Arc<dyn TransportSink>,
        callbacks: RenderCallbacks<T>,
        request: RenderRequest<T>,
        options: StreamOptions,
    ) -> StreamHandle {
        let RenderRequest {
            request_id,
            location,
            data,
            meta,
            bootstrap_modules,
            csp_nonce,
            signal,
        } = request;
        let bootstrap_modules = bootstrap_modules.or_else(|| self.config.bootstrap_modules.clone());
        let logger = self.logger_for(&request_id, &location);
        let controller = StreamController::new(sink.clone(), logger.clone());
        let handle = StreamHandle {
            controller: controller.clone(),
            location: location.clone(),
        };

        if let Some(signal) = &signal {
            let listener = {
                let controller = controller.clone();
                let location = location.clone();
                signal.add_listener(move |reason| {
                    controller.benign_abort(&format!(
                        "Request aborted ({}) for location: {}",
                        reason, location
                    ));
                })
            };
            match listener {
                Some(id) => {
                    let signal = signal.clone();
                    controller.set_remove_abort_listener(move || {
                        // Already gone if it fired.
                        signal.remove_listener(id).ok();
                        Ok(())
                    });
                }
                None => {
                    controller.benign_abort(&format!(
                        "Request aborted before stream start for location: {}",
                        location
                    ));
                    return handle;
                }
            }
        }

        let callbacks = Arc::new(callbacks.normalize());

        let guards = TransportGuards::wire(
            sink.clone(),
            GuardCallbacks::new(
                {
                    let controller = controller.clone();
                    move |why: &str| {
                        controller.benign_abort(why);
                    }
                },
                {
                    let controller = controller.clone();
                    let callbacks = callbacks.clone();
                    move |err: RenderError| fail(&controller, &callbacks, err)
                },
            )
            .on_finish({
                let controller = controller.clone();
                move || {
                    controller.complete(STREAM_FINISHED);
                }
            })
            .benign_pattern(self.benign.clone()),
        );
        controller.set_guards_cleanup(move || {
            let failures = guards.cleanup();
            if failures.is_empty() {
                return Ok(());
            }
            let reasons: Vec<String> = failures.iter().map(ToString::to_string).collect();
            anyhow::bail!("{} guard removal(s) failed: {}", failures.len(), reasons.join("; "))
        });

        let budget = options
            .shell_timeout
            .unwrap_or_else(|| self.config.shell_timeout());
        let timer = Arc::new(ShellTimer::start(budget, {
            let controller = controller.clone();
            let callbacks = callbacks.clone();
            let location = location.clone();
            move || {
                let err = RenderError::ShellTimeout {
                    ms: budget.as_millis() as u64,
                    location,
                };
                fail(&controller, &callbacks, err);
            }
        }));
        controller.set_stop_shell_timer({
            let timer = timer.clone();
            move || {
                timer.cancel();
                Ok(())
            }
        });

        let store = Arc::new(DataStore::new(data));
        let ctx = RenderContext {
            location: location.clone(),
            store: store.clone(),
            meta: meta.clone(),
            bootstrap_modules: bootstrap_modules.clone(),
            nonce: csp_nonce.clone(),
        };
        let driver = StreamDriver {
            state: Arc::new(DriverState {
                head: self.bind_head(meta, location.clone(), bootstrap_modules, csp_nonce),
                controller: controller.clone(),
                callbacks,
                store,
                timer,
                sink,
                benign: self.benign.clone(),
                location,
                runtime: Handle::current(),
                engine_stream: OnceCell::new(),
                shell_ready: AtomicBool::new(false),
                piped: AtomicBool::new(false),
            }),
        };

        logger
            .entry(LogLevel::Debug, "Starting streamed render")
            .duration_ms("shell_timeout_ms", budget)
            .emit();

        match self.engine.render_to_stream(&ctx, Arc::new(driver.clone())) {
            Ok(stream) => {
                let stream: Arc<dyn EngineStream> = Arc::from(stream);
                controller.set_stream_abort({
                    let stream = stream.clone();
                    move || {
                        stream.abort();
                        Ok(())
                    }
                });
                driver.attach(stream);
            }
            Err(err) => {
                logger
                    .entry(LogLevel::Error, "Render engine failed to start")
                    .field("error", err.to_string())
                    .emit();
                driver.fail(err);
            }
        }

        handle
    }
}

/// Fail the stream, notifying the caller only if this failure settles it.
fn fail<T>(controller: &StreamController, callbacks: &Callbacks<T>, err: RenderError) {
    controller.fatal_abort_with(err, |err| (callbacks.on_error)(err));
}

struct DriverState<T> {
    controller: StreamController,
    callbacks: Arc<Callbacks<T>>,
    store: Arc<DataStore<T>>,
    head: BoundHead<T>,
    timer: Arc<ShellTimer>,
    sink: Arc<dyn TransportSink>,
    benign: BenignPattern,
    location: String,
    runtime: Handle,
    engine_stream: OnceCell<Arc<dyn EngineStream>>,
    shell_ready: AtomicBool,
    piped: AtomicBool,
}

/// Observer handed to the engine for one streamed render.
struct StreamDriver<T> {
    state: Arc<DriverState<T>>,
}

impl<T> Clone for StreamDriver<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> StreamDriver<T>
where
    T: Send + Sync + 'static,
{
    fn attach(&self, stream: Arc<dyn EngineStream>) {
        if self.state.engine_stream.set(stream).is_ok() {
            // The engine may have signalled the shell before returning.
            self.pipe_once();
        }
    }

    /// Pipe the engine into the sink once the shell is ready and the handle
    /// is known, at most once.
    fn pipe_once(&self) {
        let state = &self.state;
        if !state.shell_ready.load(Ordering::Acquire) || state.controller.is_aborted() {
            return;
        }
        let Some(stream) = state.engine_stream.get() else {
            return;
        };
        if state.piped.swap(true, Ordering::AcqRel) {
            return;
        }
        stream.pipe(state.sink.clone());
    }

    fn fail(&self, err: RenderError) {
        fail(&self.state.controller, &self.state.callbacks, err);
    }

    fn deliver(&self) {
        let state = &self.state;
        if state.controller.is_aborted() {
            return;
        }

        match state.store.snapshot() {
            Snapshot::Ready(data) => {
                state.controller.advance(LifecyclePhase::AllReady, "all_ready");
                (state.callbacks.on_all_ready)(&data);
                (state.callbacks.on_finish)(&data);
            }
            Snapshot::Pending(pending) => {
                let driver = self.clone();
                state.runtime.spawn(async move {
                    match pending.await {
                        Ok(_) => driver.deliver(),
                        Err(err) => {
                            driver
                                .state
                                .controller
                                .logger()
                                .entry(LogLevel::Error, "Data promise rejected")
                                .field("error", err.to_string())
                                .emit();
                            driver.fail(err.into());
                        }
                    }
                });
            }
            Snapshot::Failed(err) => {
                state
                    .controller
                    .logger()
                    .entry(LogLevel::Error, "Unexpected error while delivering data")
                    .field("error", err.to_string())
                    .emit();
                self.fail(err.into());
            }
        }
    }
}

impl<T> StreamObserver for StreamDriver<T>
where
    T: Send + Sync + 'static,
{
    fn shell_ready(&self) {
        let state = &self.state;
        if state.controller.is_aborted() {
            return;
        }
        state.timer.cancel();
        state.controller.advance(LifecyclePhase::ShellReady, "shell_ready");

        // Unresolved data only means the head cannot reflect it yet.
        let data = match state.store.snapshot() {
            Snapshot::Ready(data) => Some(data),
            Snapshot::Pending(_) | Snapshot::Failed(_) => None,
        };
        let head = (state.head)(data.as_deref());
        if let Err(err) = (state.callbacks.on_head)(&head) {
            state
                .controller
                .logger()
                .warn(&format!("onHead callback failed: {:#}", err));
        }

        state.shell_ready.store(true, Ordering::Release);
        self.pipe_once();

        if let Err(err) = (state.callbacks.on_shell_ready)() {
            state
                .controller
                .logger()
                .warn(&format!("onShellReady callback failed: {:#}", err));
        }
    }

    fn all_ready(&self) {
        self.deliver();
    }

    fn shell_error(&self, err: RenderError) {
        if self.state.controller.is_aborted() {
            return;
        }
        self.state.timer.cancel();
        self.fail(err);
    }

    fn stream_error(&self, err: RenderError) {
        let state = &self.state;
        if state.controller.is_aborted() {
            return;
        }
        if state.benign.is_benign_error(&err) {
            state.controller.benign_abort(&format!(
                "{} for location: {}",
                CLIENT_DISCONNECTED, state.location
            ));
            return;
        }
        self.fail(err);
    }
}
