//! Configuration management commands.

use anyhow::{Context as _, Result};

use super::{ConfigArgs, ConfigCommand};
use crate::context::Context;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show { toml } => show_config(toml, ctx),
        ConfigCommand::Validate => validate_config(ctx),
    }
}

fn show_config(as_toml: bool, ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    if as_toml {
        let rendered = toml::to_string_pretty(&ctx.config).context("Failed to serialize config")?;
        print!("{}", rendered);
        return Ok(());
    }

    ctx.output.header("Current Configuration");
    match &ctx.config_path {
        Some(path) => ctx.output.kv("file", &path.display().to_string()),
        None => ctx.output.kv("file", "(defaults)"),
    }
    ctx.output.kv("app_name", &ctx.config.app_name);
    ctx.output
        .kv("shell_timeout_ms", &ctx.config.shell_timeout_ms.to_string());
    ctx.output.kv("log_level", &ctx.config.log_level.to_string());
    ctx.output
        .kv("log_format", &format!("{:?}", ctx.config.log_format).to_lowercase());
    if let Some(ref pattern) = ctx.config.benign_error_pattern {
        ctx.output.kv("benign_error_pattern", pattern);
    }
    if let Some(ref modules) = ctx.config.bootstrap_modules {
        ctx.output.kv("bootstrap_modules", modules);
    }

    if !ctx.config.environments.is_empty() {
        let mut names: Vec<_> = ctx.config.environments.keys().cloned().collect();
        names.sort();
        ctx.output.kv("environments", &names.join(", "));
    }

    Ok(())
}

fn validate_config(ctx: &Context) -> Result<()> {
    ctx.config.validate()?;
    ctx.config.benign_pattern()?;

    for name in ctx.config.environments.keys() {
        ctx.config
            .for_environment(name)
            .validate()
            .with_context(|| format!("Environment '{}' is invalid", name))?;
    }

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "valid": true }));
    } else {
        ctx.output.success("Configuration is valid");
    }
    Ok(())
}
