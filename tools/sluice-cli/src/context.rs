//! CLI execution context.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use sluice_render::RendererConfig;

use crate::output::Output;

const CONFIG_NAMES: [&str; 3] = ["sluice.toml", ".sluice.toml", "sluice.json"];

/// Execution context for CLI commands.
pub struct Context {
    /// Renderer configuration, with environment overrides applied.
    pub config: RendererConfig,
    /// Where the configuration came from, if a file was found.
    pub config_path: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
}

impl Context {
    /// Load context from an explicit config file or the nearest one found
    /// from the working directory upwards.
    pub fn load(config_path: Option<&str>, env: Option<&str>, output: Output) -> Result<Self> {
        let (config, config_path) = match config_path {
            Some(path) => (RendererConfig::load(path)?, Some(PathBuf::from(path))),
            None => {
                let cwd = std::env::current_dir().context("Failed to get current directory")?;
                match find_config(&cwd) {
                    Some(path) => (RendererConfig::load(&path)?, Some(path)),
                    None => (RendererConfig::default(), None),
                }
            }
        };

        let config = match env {
            Some(env) => {
                if !config.environments.contains_key(env) {
                    output.warn(&format!("No overrides for environment '{}'", env));
                }
                config.for_environment(env)
            }
            None => config,
        };

        Ok(Self {
            config,
            config_path,
            output,
        })
    }
}

/// Find a config file in the directory tree.
fn find_config(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        CONFIG_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    })
}
