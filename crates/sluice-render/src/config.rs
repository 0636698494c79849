//! Renderer configuration.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sluice_core::ConfigError;
use sluice_observability::{LogFormat, LogLevel};
use sluice_streaming::BenignPattern;

/// Renderer configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Application name, used in log output and the default page title.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Budget for the shell to become ready, in milliseconds.
    #[serde(default = "default_shell_timeout_ms")]
    pub shell_timeout_ms: u64,

    /// Regex source overriding the default client-disconnect pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benign_error_pattern: Option<String>,

    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,

    /// Minimum log level.
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Bootstrap module used when a request does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_modules: Option<String>,

    /// Environment-specific overrides.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environments: HashMap<String, EnvironmentConfig>,
}

fn default_app_name() -> String {
    "sluice".to_string()
}

fn default_shell_timeout_ms() -> u64 {
    10_000
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            shell_timeout_ms: default_shell_timeout_ms(),
            benign_error_pattern: None,
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            bootstrap_modules: None,
            environments: HashMap::new(),
        }
    }
}

impl RendererConfig {
    /// Load config from a file. `.json` files are parsed as JSON, anything
    /// else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?
        };

        config
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate TOML config text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shell_timeout_ms == 0 {
            return Err(ConfigError::ZeroShellTimeout);
        }
        self.benign_pattern()?;
        for env in self.environments.values() {
            if env.shell_timeout_ms == Some(0) {
                return Err(ConfigError::ZeroShellTimeout);
            }
        }
        Ok(())
    }

    /// The configured shell budget.
    pub fn shell_timeout(&self) -> Duration {
        Duration::from_millis(self.shell_timeout_ms)
    }

    /// Compile the benign-error pattern, falling back to the default.
    pub fn benign_pattern(&self) -> Result<BenignPattern, ConfigError> {
        match &self.benign_error_pattern {
            Some(pattern) => BenignPattern::new(pattern),
            None => Ok(BenignPattern::default()),
        }
    }

    /// Config with the named environment's overrides applied.
    pub fn for_environment(&self, env: &str) -> RendererConfig {
        let mut config = self.clone();

        if let Some(overrides) = self.environments.get(env) {
            if let Some(ms) = overrides.shell_timeout_ms {
                config.shell_timeout_ms = ms;
            }
            if let Some(level) = overrides.log_level {
                config.log_level = level;
            }
            if let Some(format) = overrides.log_format {
                config.log_format = format;
            }
        }

        config
    }
}

/// Per-environment overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,
}

/// Per-call streaming options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Overrides the renderer's shell budget for this call.
    pub shell_timeout: Option<Duration>,
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shell budget for this call.
    pub fn with_shell_timeout(mut self, timeout: Duration) -> Self {
        self.shell_timeout = Some(timeout);
        self
    }
}
