//! Output formatting for the CLI.

use std::io::Write;
use std::time::Duration;

use console::style;

/// Output handler for CLI messages.
///
/// Status lines go to stderr so rendered markup on stdout stays clean.
#[derive(Clone)]
pub struct Output {
    verbose: bool,
    json: bool,
}

impl Output {
    /// Create a new output handler.
    pub fn new(verbose: bool, json: bool) -> Self {
        Self { verbose, json }
    }

    /// Print a success message.
    pub fn success(&self, msg: &str) {
        if self.json {
            return;
        }
        eprintln!("{} {}", style("✓").green(), msg);
    }

    /// Print a warning message.
    pub fn warn(&self, msg: &str) {
        if self.json {
            return;
        }
        eprintln!("{} {}", style("⚠").yellow(), msg);
    }

    /// Print an error message.
    pub fn error(&self, msg: &str) {
        if self.json {
            eprintln!("{}", serde_json::json!({ "error": msg }));
            return;
        }
        eprintln!("{} {}", style("✗").red(), style(msg).red());
    }

    /// Print a debug message (only in verbose mode).
    pub fn debug(&self, msg: &str) {
        if !self.verbose || self.json {
            return;
        }
        eprintln!("{} {}", style("→").dim(), style(msg).dim());
    }

    /// Print a header/title.
    pub fn header(&self, msg: &str) {
        if self.json {
            return;
        }
        eprintln!("\n{}", style(msg).bold().underlined());
    }

    /// Print JSON output.
    pub fn json<T: serde::Serialize>(&self, value: &T) {
        if let Ok(json) = serde_json::to_string_pretty(value) {
            println!("{}", json);
        }
    }

    /// Print a key-value pair.
    pub fn kv(&self, key: &str, value: &str) {
        if self.json {
            return;
        }
        eprintln!("  {}: {}", style(key).dim(), value);
    }

    /// Write rendered markup to stdout as it arrives.
    pub fn markup(&self, chunk: &[u8]) -> std::io::Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(chunk)?;
        stdout.flush()
    }

    /// Check if JSON mode is enabled.
    pub fn is_json(&self) -> bool {
        self.json
    }
}

/// Status badge for a settled render.
pub fn status_badge(status: &str) -> String {
    match status {
        "completed" => style(status).green().to_string(),
        "cancelled" => style(status).yellow().to_string(),
        "failed" => style(status).red().to_string(),
        _ => status.to_string(),
    }
}

/// Format a duration as milliseconds, or a dash when absent.
pub fn format_millis(duration: Option<Duration>) -> String {
    match duration {
        Some(d) if d.as_secs() >= 1 => format!("{:.2}s", d.as_secs_f64()),
        Some(d) => format!("{}ms", d.as_millis()),
        None => "-".to_string(),
    }
}
