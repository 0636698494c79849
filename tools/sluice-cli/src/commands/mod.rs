//! CLI command implementations.

pub mod config;
pub mod render;

use clap::{Args, Subcommand};

/// Arguments for the render command.
#[derive(Args)]
pub struct RenderArgs {
    /// Location (URL path) to render.
    #[arg(default_value = "/")]
    pub location: String,

    /// Stream the document instead of rendering it to completion.
    #[arg(short, long)]
    pub stream: bool,

    /// Page data as a JSON document.
    #[arg(short, long)]
    pub data: Option<String>,

    /// Delay data resolution, simulating a slow backend.
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Shell timeout override in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Page metadata as key=value (repeatable).
    #[arg(short, long)]
    pub meta: Vec<String>,

    /// CSP nonce for inline scripts.
    #[arg(long)]
    pub nonce: Option<String>,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show {
        /// Print as TOML instead of key/value lines.
        #[arg(long)]
        toml: bool,
    },
    /// Validate the config file.
    Validate,
}
