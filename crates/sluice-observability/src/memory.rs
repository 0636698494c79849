//! In-memory log recorder.

use std::sync::{Arc, Mutex, PoisonError};

use crate::logging::{LogFields, LogLevel, RenderLogger};

/// One recorded log call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedLog {
    pub level: LogLevel,
    pub message: String,
    pub fields: LogFields,
}

/// Logger that keeps every entry in memory.
///
/// Clones share the same buffer, so a clone can be handed to a renderer
/// and inspected afterwards.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogger {
    entries: Arc<Mutex<Vec<RecordedLog>>>,
}

impl MemoryLogger {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded entries.
    pub fn entries(&self) -> Vec<RecordedLog> {
        self.lock().clone()
    }

    /// Messages recorded at exactly `level`.
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.message.clone())
            .collect()
    }

    /// Whether any entry at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.lock()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }

    /// Drop all recorded entries.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedLog>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RenderLogger for MemoryLogger {
    fn log(&self, level: LogLevel, message: &str, fields: LogFields) {
        self.lock().push(RecordedLog {
            level,
            message: message.to_string(),
            fields,
        });
    }
}
