//! Structured logging with request context.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sluice_core::RequestId;

/// Structured fields attached to a log entry.
pub type LogFields = BTreeMap<String, serde_json::Value>;

/// Log level for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace => write!(f, "TRACE"),
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Sink for the render pipeline's diagnostics.
///
/// Implementations must be cheap to call from any event source; the
/// streaming controller logs from transport, timer and signal callbacks.
pub trait RenderLogger: Send + Sync {
    /// Emit one entry.
    fn log(&self, level: LogLevel, message: &str, fields: LogFields);

    /// Log at debug level.
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, LogFields::new());
    }

    /// Log at info level.
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, LogFields::new());
    }

    /// Log at warn level.
    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message, LogFields::new());
    }

    /// Log at error level.
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message, LogFields::new());
    }
}

impl<'l> dyn RenderLogger + 'l {
    /// Start building an entry with structured fields.
    pub fn entry(&self, level: LogLevel, message: impl Into<String>) -> LogBuilder<'_> {
        LogBuilder::new(self, level, message)
    }
}

/// A structured log entry.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// Log level.
    pub level: LogLevel,
    /// Log message.
    pub message: String,
    /// Request ID for correlation.
    pub request_id: String,
    /// Location being rendered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Additional structured fields.
    #[serde(flatten)]
    pub fields: LogFields,
    /// Timestamp in microseconds since request start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_us: Option<u64>,
}

impl LogEntry {
    /// Format as JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.message.clone())
    }

    /// Format as human-readable string.
    pub fn to_human(&self) -> String {
        let mut s = format!("[{}] {}", self.level, self.message);

        if let Some(location) = &self.location {
            s.push_str(&format!(" @ {}", location));
        }

        if let Some(elapsed) = self.elapsed_us {
            s.push_str(&format!(" ({}us)", elapsed));
        }

        if !self.fields.is_empty() {
            s.push_str(" | ");
            let fields: Vec<String> = self
                .fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            s.push_str(&fields.join(" "));
        }

        s
    }
}

/// Output format for logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (for production/log aggregation).
    #[default]
    Json,
    /// Human-readable format (for development).
    Human,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "human" | "text" => Ok(Self::Human),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Structured logger with request context.
///
/// Entries are rendered as JSON or text and handed to `tracing` at the
/// matching level, so the host's subscriber decides where they end up.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    request_id: RequestId,
    location: Option<String>,
    start_time: Instant,
    min_level: LogLevel,
    format: LogFormat,
}

impl StructuredLogger {
    /// Create a new logger with request context.
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            location: None,
            start_time: Instant::now(),
            min_level: LogLevel::Info,
            format: LogFormat::Json,
        }
    }

    /// Set the location being rendered.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set minimum log level.
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Set output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Get the request ID.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Get elapsed time since logger creation.
    pub fn elapsed_us(&self) -> u64 {
        self.start_time.elapsed().as_micros() as u64
    }

    /// Build the entry that `log` would emit, or `None` if filtered out.
    pub fn entry_for(&self, level: LogLevel, message: &str, fields: LogFields) -> Option<LogEntry> {
        if level < self.min_level {
            return None;
        }

        Some(LogEntry {
            level,
            message: message.to_string(),
            request_id: self.request_id.to_string(),
            location: self.location.clone(),
            fields,
            elapsed_us: Some(self.elapsed_us()),
        })
    }
}

impl RenderLogger for StructuredLogger {
    fn log(&self, level: LogLevel, message: &str, fields: LogFields) {
        let Some(entry) = self.entry_for(level, message, fields) else {
            return;
        };

        let output = match self.format {
            LogFormat::Json => entry.to_json(),
            LogFormat::Human => entry.to_human(),
        };

        match level {
            LogLevel::Trace => tracing::trace!(target: "sluice", "{}", output),
            LogLevel::Debug => tracing::debug!(target: "sluice", "{}", output),
            LogLevel::Info => tracing::info!(target: "sluice", "{}", output),
            LogLevel::Warn => tracing::warn!(target: "sluice", "{}", output),
            LogLevel::Error => tracing::error!(target: "sluice", "{}", output),
        }
    }
}

/// Builder for log entries with fluent API.
pub struct LogBuilder<'a> {
    logger: &'a dyn RenderLogger,
    level: LogLevel,
    message: String,
    fields: LogFields,
}

impl<'a> LogBuilder<'a> {
    /// Create a new log builder.
    pub fn new(logger: &'a dyn RenderLogger, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            logger,
            level,
            message: message.into(),
            fields: LogFields::new(),
        }
    }

    /// Add a string field.
    pub fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields
            .insert(key.to_string(), serde_json::json!(value.into()));
        self
    }

    /// Add an integer field.
    pub fn field_i64(mut self, key: &str, value: i64) -> Self {
        self.fields.insert(key.to_string(), serde_json::json!(value));
        self
    }

    /// Add a boolean field.
    pub fn field_bool(mut self, key: &str, value: bool) -> Self {
        self.fields.insert(key.to_string(), serde_json::json!(value));
        self
    }

    /// Add a duration field (in milliseconds).
    pub fn duration_ms(mut self, key: &str, duration: Duration) -> Self {
        self.fields
            .insert(key.to_string(), serde_json::json!(duration.as_millis() as u64));
        self
    }

    /// Emit the log entry.
    pub fn emit(self) {
        self.logger.log(self.level, &self.message, self.fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger() -> StructuredLogger {
        StructuredLogger::new(RequestId::from_string("req-1")).with_location("/home")
    }

    #[test]
    fn test_entry_filtered_below_min_level() {
        let logger = logger().with_min_level(LogLevel::Warn);
        assert!(logger.entry_for(LogLevel::Info, "hi", LogFields::new()).is_none());
        assert!(logger.entry_for(LogLevel::Error, "bad", LogFields::new()).is_some());
    }

    #[test]
    fn test_entry_json_contains_context() {
        let mut fields = LogFields::new();
        fields.insert("reason".to_string(), serde_json::json!("ECONNRESET"));
        let entry = logger()
            .entry_for(LogLevel::Warn, "client left", fields)
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&entry.to_json()).unwrap();

        assert_eq!(json["level"], "warn");
        assert_eq!(json["request_id"], "req-1");
        assert_eq!(json["location"], "/home");
        assert_eq!(json["reason"], "ECONNRESET");
    }

    #[test]
    fn test_entry_human_format() {
        let entry = logger()
            .entry_for(LogLevel::Error, "stream failed", LogFields::new())
            .unwrap();
        let text = entry.to_human();
        assert!(text.starts_with("[ERROR] stream failed @ /home"));
    }

    #[test]
    fn test_level_and_format_parse() {
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!("human".parse::<LogFormat>(), Ok(LogFormat::Human));
    }

    #[test]
    fn test_structured_logger_emits_without_subscriber() {
        let logger = logger().with_format(LogFormat::Human);
        logger.warn("no subscriber installed");
        logger.error("still fine");
    }
}
