//! Stream lifecycle controller.
//!
//! Owns the single terminal outcome of one streamed render. Transport
//! events, the shell timer, the external abort signal, engine callbacks and
//! manual aborts all race into the same gate: the first to flip `aborted`
//! performs teardown and settles `done`, every later attempt is a no-op.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sluice_core::{LifecyclePhase, RenderError, TimingContext};
use sluice_observability::{LogLevel, RenderLogger};

use crate::settlement::{Done, Settlement};
use crate::sink::TransportSink;
use crate::teardown::{run_best_effort, CleanupHook};

#[derive(Default)]
struct CleanupHooks {
    stop_shell_timer: Option<CleanupHook>,
    remove_abort_listener: Option<CleanupHook>,
    guards_cleanup: Option<CleanupHook>,
    stream_abort: Option<CleanupHook>,
}

#[derive(Debug, Clone, Copy)]
enum HookSlot {
    StopShellTimer,
    RemoveAbortListener,
    GuardsCleanup,
    StreamAbort,
}

impl HookSlot {
    fn name(self) -> &'static str {
        match self {
            Self::StopShellTimer => "stop_shell_timer",
            Self::RemoveAbortListener => "remove_abort_listener",
            Self::GuardsCleanup => "guards_cleanup",
            Self::StreamAbort => "stream_abort",
        }
    }
}

struct ControllerInner {
    aborted: AtomicBool,
    hooks: Mutex<CleanupHooks>,
    settlement: Settlement,
    sink: Arc<dyn TransportSink>,
    logger: Arc<dyn RenderLogger>,
    phase: Mutex<LifecyclePhase>,
    timing: Mutex<TimingContext>,
}

/// Lifecycle gate for one streamed render.
///
/// Two states: live, then settled. Cloning yields another handle to the
/// same controller.
#[derive(Clone)]
pub struct StreamController {
    inner: Arc<ControllerInner>,
}

impl StreamController {
    /// Create a live controller bound to `sink`.
    pub fn new(sink: Arc<dyn TransportSink>, logger: Arc<dyn RenderLogger>) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                aborted: AtomicBool::new(false),
                hooks: Mutex::new(CleanupHooks::default()),
                settlement: Settlement::new(),
                sink,
                logger,
                phase: Mutex::new(LifecyclePhase::Start),
                timing: Mutex::new(TimingContext::new()),
            }),
        }
    }

    /// Register the render engine's abort.
    pub fn set_stream_abort<F>(&self, hook: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.register(HookSlot::StreamAbort, Box::new(hook));
    }

    /// Register the shell timer's cancellation.
    pub fn set_stop_shell_timer<F>(&self, hook: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.register(HookSlot::StopShellTimer, Box::new(hook));
    }

    /// Register removal of the external abort listener.
    pub fn set_remove_abort_listener<F>(&self, hook: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.register(HookSlot::RemoveAbortListener, Box::new(hook));
    }

    /// Register detachment of the transport guards.
    pub fn set_guards_cleanup<F>(&self, hook: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.register(HookSlot::GuardsCleanup, Box::new(hook));
    }

    /// End the stream as an expected event (client left, manual abort).
    ///
    /// Logs `why` at warn level, tears down and resolves `done`. Returns
    /// `false` if the stream had already settled.
    pub fn benign_abort(&self, why: &str) -> bool {
        self.settle(
            LogLevel::Warn,
            why,
            LifecyclePhase::Cancelled(why.to_string()),
            None,
            |_| {},
        )
    }

    /// End the stream after a normal finish.
    ///
    /// Same state machine as [`benign_abort`](Self::benign_abort), logged at
    /// info level.
    pub fn complete(&self, why: &str) -> bool {
        self.settle(LogLevel::Info, why, LifecyclePhase::Completion, None, |_| {})
    }

    /// End the stream as a failure.
    ///
    /// Logs at error level, tears down and rejects `done` with `err`.
    ///
    /// Passing `None` resolves `done` instead of rejecting it. This is
    /// intentional and kept for callers that need a fatal teardown without
    /// an error value; it must not be used to signal a real failure.
    pub fn fatal_abort(&self, err: impl Into<Option<RenderError>>) -> bool {
        match err.into() {
            Some(err) => self.fatal_abort_with(err, |_| {}),
            None => self.settle(
                LogLevel::Error,
                "Stream aborted without an error value",
                LifecyclePhase::Error("unspecified".to_string()),
                None,
                |_| {},
            ),
        }
    }

    /// Fail the stream and hand `err` to `notify` first.
    ///
    /// `notify` runs only if this call wins the gate, before teardown, with
    /// the same error `done` rejects with. Losing callers never see it.
    pub fn fatal_abort_with<N>(&self, err: RenderError, notify: N) -> bool
    where
        N: FnOnce(&RenderError),
    {
        let message = format!("Stream failed: {}", err);
        self.settle(
            LogLevel::Error,
            &message,
            LifecyclePhase::Error(err.to_string()),
            Some(err),
            notify,
        )
    }

    /// Whether the stream has settled.
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    /// Completion of the stream.
    pub fn done(&self) -> Done {
        self.inner.settlement.done()
    }

    /// The underlying settlement gate.
    pub fn settlement(&self) -> &Settlement {
        &self.inner.settlement
    }

    /// The sink this controller owns.
    pub fn sink(&self) -> &Arc<dyn TransportSink> {
        &self.inner.sink
    }

    /// The logger this controller writes to.
    pub fn logger(&self) -> &Arc<dyn RenderLogger> {
        &self.inner.logger
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> LifecyclePhase {
        lock(&self.inner.phase).clone()
    }

    /// Advance a live stream to a non-terminal phase and record a mark.
    pub fn advance(&self, phase: LifecyclePhase, mark: &str) {
        if self.is_aborted() {
            return;
        }
        *lock(&self.inner.phase) = phase;
        lock(&self.inner.timing).mark(mark);
    }

    /// Snapshot of the timing marks.
    pub fn timing(&self) -> TimingContext {
        lock(&self.inner.timing).clone()
    }

    fn register(&self, slot: HookSlot, hook: CleanupHook) {
        let late = {
            let mut hooks = lock(&self.inner.hooks);
            if self.is_aborted() {
                Some(hook)
            } else {
                let target = match slot {
                    HookSlot::StopShellTimer => &mut hooks.stop_shell_timer,
                    HookSlot::RemoveAbortListener => &mut hooks.remove_abort_listener,
                    HookSlot::GuardsCleanup => &mut hooks.guards_cleanup,
                    HookSlot::StreamAbort => &mut hooks.stream_abort,
                };
                *target = Some(hook);
                None
            }
        };

        // Teardown already ran; a hook registered afterwards runs immediately.
        if let Some(hook) = late {
            self.report(run_best_effort([(slot.name(), hook)]));
        }
    }

    fn settle<N>(
        &self,
        level: LogLevel,
        message: &str,
        phase: LifecyclePhase,
        error: Option<RenderError>,
        notify: N,
    ) -> bool
    where
        N: FnOnce(&RenderError),
    {
        if self.inner.aborted.swap(true, Ordering::AcqRel) {
            return false;
        }

        if let Some(err) = &error {
            notify(err);
        }

        self.inner.logger.log(level, message, Default::default());
        *lock(&self.inner.phase) = phase;
        lock(&self.inner.timing).mark("settled");

        self.teardown();

        match error {
            Some(err) => self.inner.settlement.reject(err),
            None => self.inner.settlement.resolve(),
        };
        true
    }

    fn teardown(&self) {
        let hooks = std::mem::take(&mut *lock(&self.inner.hooks));
        let slots = [
            (HookSlot::StopShellTimer, hooks.stop_shell_timer),
            (HookSlot::RemoveAbortListener, hooks.remove_abort_listener),
            (HookSlot::GuardsCleanup, hooks.guards_cleanup),
            (HookSlot::StreamAbort, hooks.stream_abort),
        ];
        let mut steps: Vec<(&'static str, CleanupHook)> = slots
            .into_iter()
            .filter_map(|(slot, hook)| hook.map(|hook| (slot.name(), hook)))
            .collect();

        let sink = self.inner.sink.clone();
        steps.push((
            "destroy_sink",
            Box::new(move || {
                if sink.writable_ended() || sink.destroyed() {
                    return Ok(());
                }
                sink.destroy()?;
                Ok(())
            }),
        ));

        self.report(run_best_effort(steps));
    }

    fn report(&self, failures: Vec<crate::teardown::CleanupFailure>) {
        for failure in failures {
            self.inner
                .logger
                .entry(LogLevel::Debug, "Cleanup step failed")
                .field("step", failure.step)
                .field("error", failure.error.to_string())
                .emit();
        }
    }
}

impl fmt::Debug for StreamController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamController")
            .field("aborted", &self.is_aborted())
            .field("phase", &self.phase())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
