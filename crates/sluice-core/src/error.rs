//! Error types shared across the render pipeline.

use std::io;
use std::sync::Arc;

/// Error carried by a failed render.
///
/// `RenderError` is `Clone` so that one terminal outcome can be observed by
/// every awaiter of a stream's completion. Transport failures keep the
/// original `io::Error` and display it unchanged.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    #[error("Shell not ready after {ms}ms for location: {location}")]
    ShellTimeout { ms: u64, location: String },

    #[error(transparent)]
    Transport(Arc<io::Error>),

    #[error("{0}")]
    Engine(String),

    #[error("{0}")]
    Data(String),

    #[error("Render aborted: {0}")]
    Aborted(String),
}

impl RenderError {
    /// Create an engine error from a message.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }

    /// Create a data error from a message.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    /// Whether this error was synthesized by the shell timer.
    pub fn is_shell_timeout(&self) -> bool {
        matches!(self, Self::ShellTimeout { .. })
    }

    /// The underlying I/O error kind for transport failures.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Transport(err) => Some(err.kind()),
            _ => None,
        }
    }
}

impl From<io::Error> for RenderError {
    fn from(err: io::Error) -> Self {
        Self::Transport(Arc::new(err))
    }
}

/// Error from the abort signal's listener registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    #[error("Listener {0} is not registered")]
    NotRegistered(u64),
}

/// Error loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid benign error pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Shell timeout must be greater than zero")]
    ZeroShellTimeout,

    #[error("Failed to parse config: {0}")]
    Parse(String),
}
