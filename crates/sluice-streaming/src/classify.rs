//! Benign transport error classification.
//!
//! Client disconnects surface as transport errors; they are expected
//! operational events and must not be reported as render failures.

use std::error::Error;
use std::io;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use sluice_core::{ConfigError, RenderError};

/// Default pattern for messages produced by a client going away.
pub const DEFAULT_BENIGN_PATTERN: &str =
    r"ECONNRESET|EPIPE|socket hang up|aborted|premature|broken pipe|connection reset";

static DEFAULT_REGEX: Lazy<Option<Regex>> = Lazy::new(|| {
    RegexBuilder::new(DEFAULT_BENIGN_PATTERN)
        .case_insensitive(true)
        .build()
        .ok()
});

/// Case-insensitive message pattern separating client disconnects from
/// real faults.
#[derive(Debug, Clone)]
pub struct BenignPattern {
    regex: Option<Regex>,
}

impl BenignPattern {
    /// Compile a custom pattern (matched case-insensitively).
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { regex: Some(regex) })
    }

    /// The pattern source.
    pub fn as_str(&self) -> &str {
        self.regex.as_ref().map(Regex::as_str).unwrap_or_default()
    }

    /// Whether `message` looks like a client disconnect.
    pub fn is_benign_message(&self, message: &str) -> bool {
        let Some(regex) = &self.regex else {
            return false;
        };
        !message.is_empty() && regex.is_match(message)
    }

    /// Classify an arbitrary error; a missing error is never benign.
    pub fn is_benign(&self, err: Option<&(dyn Error + 'static)>) -> bool {
        err.map(|e| self.is_benign_message(&e.to_string()))
            .unwrap_or(false)
    }

    /// Classify a render error, also honouring disconnect I/O kinds.
    pub fn is_benign_error(&self, err: &RenderError) -> bool {
        if let Some(kind) = err.io_kind() {
            if is_disconnect_kind(kind) {
                return true;
            }
        }
        self.is_benign_message(&err.to_string())
    }
}

impl Default for BenignPattern {
    fn default() -> Self {
        Self {
            regex: (*DEFAULT_REGEX).clone(),
        }
    }
}

fn is_disconnect_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}
