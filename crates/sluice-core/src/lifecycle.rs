//! Stream lifecycle tracking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Lifecycle phases for a streamed render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Render started, shell not ready yet.
    Start,
    /// Shell is ready and piping to the transport.
    ShellReady,
    /// All data delivered to the caller.
    AllReady,
    /// Stream finished normally.
    Completion,
    /// Stream ended benignly (client left, manual abort, signal).
    Cancelled(String),
    /// Stream failed.
    Error(String),
}

impl LifecyclePhase {
    /// Whether the phase is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completion | Self::Cancelled(_) | Self::Error(_)
        )
    }
}

/// Timing marks for one render.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    marks: HashMap<String, Instant>,
}

impl TimingContext {
    /// Create a new timing context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: HashMap::new(),
        }
    }

    /// Record a timing mark. The first mark under a name wins.
    pub fn mark(&mut self, name: &str) {
        self.marks
            .entry(name.to_string())
            .or_insert_with(Instant::now);
    }

    /// Offset of a mark from the start.
    pub fn since_start(&self, name: &str) -> Option<Duration> {
        self.marks.get(name).map(|t| t.duration_since(self.start))
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get time to shell ready.
    pub fn time_to_shell(&self) -> Option<Duration> {
        self.since_start("shell_ready")
    }

    /// Get time until all data was delivered.
    pub fn time_to_all_ready(&self) -> Option<Duration> {
        self.since_start("all_ready")
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}
