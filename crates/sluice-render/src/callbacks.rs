//! Caller callbacks for a streamed render.

use sluice_core::RenderError;

type HeadCallback = Box<dyn Fn(&str) -> anyhow::Result<()> + Send + Sync>;
type ShellReadyCallback = Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>;
type DataCallback<T> = Box<dyn Fn(&T) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&RenderError) + Send + Sync>;

/// Optional hooks into a streamed render.
///
/// `on_head` and `on_shell_ready` are cosmetic: an error from either is
/// logged as a warning and the stream carries on. The others are called
/// unguarded.
///
/// # Example
///
/// ```rust,ignore
/// let callbacks = RenderCallbacks::new()
///     .on_head(move |head| {
///         sink.write(Bytes::from(DocumentShell::new().render_opening(head)));
///         Ok(())
///     })
///     .on_error(|err| eprintln!("render failed: {}", err));
/// ```
pub struct RenderCallbacks<T> {
    on_head: Option<HeadCallback>,
    on_shell_ready: Option<ShellReadyCallback>,
    on_all_ready: Option<DataCallback<T>>,
    on_finish: Option<DataCallback<T>>,
    on_error: Option<ErrorCallback>,
}

impl<T> RenderCallbacks<T> {
    pub fn new() -> Self {
        Self {
            on_head: None,
            on_shell_ready: None,
            on_all_ready: None,
            on_finish: None,
            on_error: None,
        }
    }

    /// Receive the computed head fragment once the shell is ready.
    pub fn on_head<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_head = Some(Box::new(f));
        self
    }

    /// Called after piping has started.
    pub fn on_shell_ready<F>(mut self, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_shell_ready = Some(Box::new(f));
        self
    }

    /// Called with the resolved data once rendering is complete.
    pub fn on_all_ready<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_all_ready = Some(Box::new(f));
        self
    }

    /// Called with the resolved data right after `on_all_ready`.
    pub fn on_finish<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_finish = Some(Box::new(f));
        self
    }

    /// Called once with the error that fails the stream.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&RenderError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Fill every empty slot with a no-op.
    pub(crate) fn normalize(self) -> Callbacks<T>
    where
        T: 'static,
    {
        Callbacks {
            on_head: self.on_head.unwrap_or_else(|| Box::new(ignore_head)),
            on_shell_ready: self.on_shell_ready.unwrap_or_else(|| Box::new(ignore_shell_ready)),
            on_all_ready: self.on_all_ready.unwrap_or_else(|| Box::new(ignore::<T>)),
            on_finish: self.on_finish.unwrap_or_else(|| Box::new(ignore::<T>)),
            on_error: self.on_error.unwrap_or_else(|| Box::new(ignore::<RenderError>)),
        }
    }
}

fn ignore_head(_: &str) -> anyhow::Result<()> {
    Ok(())
}

fn ignore_shell_ready() -> anyhow::Result<()> {
    Ok(())
}

fn ignore<V>(_: &V) {}

impl<T> Default for RenderCallbacks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for RenderCallbacks<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCallbacks")
            .field("on_head", &self.on_head.is_some())
            .field("on_shell_ready", &self.on_shell_ready.is_some())
            .field("on_all_ready", &self.on_all_ready.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Callbacks with every slot filled.
pub(crate) struct Callbacks<T> {
    pub on_head: HeadCallback,
    pub on_shell_ready: ShellReadyCallback,
    pub on_all_ready: DataCallback<T>,
    pub on_finish: DataCallback<T>,
    pub on_error: ErrorCallback,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_empty_callbacks_normalize_to_noops() {
        let callbacks = RenderCallbacks::<u32>::new().normalize();

        assert!((callbacks.on_head)("<title>x</title>").is_ok());
        assert!((callbacks.on_shell_ready)().is_ok());
        (callbacks.on_all_ready)(&1);
        (callbacks.on_finish)(&1);
        (callbacks.on_error)(&RenderError::engine("boom"));
    }

    #[test]
    fn test_supplied_callbacks_are_kept() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let callbacks = RenderCallbacks::<u32>::new()
            .on_finish(move |value| {
                h.fetch_add(*value as usize, Ordering::SeqCst);
            })
            .on_head(|_| anyhow::bail!("head rejected"))
            .normalize();

        (callbacks.on_finish)(&3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!((callbacks.on_head)("").is_err());
    }

    #[test]
    fn test_debug_shows_presence() {
        let callbacks = RenderCallbacks::<u32>::new().on_error(|_| {});
        let debug = format!("{:?}", callbacks);

        assert!(debug.contains("on_error: true"));
        assert!(debug.contains("on_head: false"));
    }
}
