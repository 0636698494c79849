//! Cancellable shell-ready timer.

use std::time::Duration;

use tokio::task::JoinHandle;

/// One-shot timer firing if the shell is not ready within its budget.
///
/// The timer knows nothing about stream state; the callback must check
/// liveness itself. Must be started inside a Tokio runtime.
#[derive(Debug)]
pub struct ShellTimer {
    handle: JoinHandle<()>,
    budget: Duration,
}

impl ShellTimer {
    /// Schedule `on_timeout` after `budget`.
    pub fn start<F>(budget: Duration, on_timeout: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            on_timeout();
        });
        Self { handle, budget }
    }

    /// Prevent the callback from firing. No-op once it has fired.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Whether the timer has fired or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// The configured budget.
    pub fn budget(&self) -> Duration {
        self.budget
    }
}
