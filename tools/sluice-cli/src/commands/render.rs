//! Render a page to stdout.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use serde_json::Value;
use sluice_core::{AbortController, LifecyclePhase, Meta, RenderError};
use sluice_data::DataSource;
use sluice_render::{RenderCallbacks, RenderRequest, Renderer, StreamOptions, ViewEngine};
use sluice_streaming::{escape_html, ChannelSink, DocumentShell, TransportSink};

use super::RenderArgs;
use crate::context::Context;
use crate::output::{format_millis, status_badge};

/// Run the render command.
pub async fn run(args: RenderArgs, ctx: &Context) -> Result<()> {
    let meta = parse_meta(&args.meta)?;
    let value = match &args.data {
        Some(raw) => serde_json::from_str(raw).context("Invalid --data JSON")?,
        None => Value::Object(Default::default()),
    };
    let data = data_source(value, args.delay_ms.map(Duration::from_millis));

    let shell = DocumentShell::new();
    let renderer = Renderer::new(
        ViewEngine::new(|_, data: Option<&Value>| Ok(view_markup(data)))
            .with_trailer(shell.render_closing()),
    )
    .with_config(ctx.config.clone())?;

    let abort = AbortController::new();
    let interrupt = {
        let abort = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                abort.abort("interrupted");
            }
        })
    };

    let mut request = RenderRequest::new(args.location.clone(), data)
        .with_meta(meta)
        .with_signal(abort.signal());
    if let Some(nonce) = &args.nonce {
        request = request.with_nonce(nonce.clone());
    }

    ctx.output.debug(&format!(
        "Rendering {} ({})",
        args.location,
        if args.stream { "streamed" } else { "blocking" }
    ));

    let result = if args.stream {
        let mut options = StreamOptions::new();
        if let Some(ms) = args.timeout_ms {
            options = options.with_shell_timeout(Duration::from_millis(ms));
        }
        render_streamed(&renderer, shell, request, options, ctx).await
    } else {
        render_blocking(&renderer, shell, request, ctx).await
    };

    interrupt.abort();
    result
}

async fn render_blocking(
    renderer: &Renderer<Value>,
    shell: DocumentShell,
    request: RenderRequest<Value>,
    ctx: &Context,
) -> Result<()> {
    let rendered = renderer.render_request(request).await?;

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({
            "head_content": rendered.head_content,
            "app_html": rendered.app_html,
            "aborted": rendered.aborted,
        }));
        return Ok(());
    }

    if rendered.aborted {
        ctx.output.warn("Render was cancelled");
        return Ok(());
    }

    let document = format!(
        "{}{}{}",
        shell.render_opening(&rendered.head_content),
        rendered.app_html,
        shell.render_closing()
    );
    ctx.output.markup(document.as_bytes())?;
    Ok(())
}

async fn render_streamed(
    renderer: &Renderer<Value>,
    shell: DocumentShell,
    request: RenderRequest<Value>,
    options: StreamOptions,
    ctx: &Context,
) -> Result<()> {
    let (sink, mut body) = ChannelSink::new();
    let sink: Arc<dyn TransportSink> = Arc::new(sink);

    let head_sink = sink.clone();
    let errors = ctx.output.clone();
    let callbacks = RenderCallbacks::new()
        .on_head(move |head| {
            head_sink.write(shell.render_opening(head).into());
            Ok(())
        })
        .on_error(move |err: &RenderError| errors.error(&err.to_string()));

    let handle = renderer.render_streaming(sink, callbacks, request, options);

    let mut document = Vec::new();
    while let Some(chunk) = body.recv().await {
        if ctx.output.is_json() {
            document.extend_from_slice(&chunk);
        } else {
            ctx.output.markup(&chunk)?;
        }
    }

    let outcome = handle.done().await;
    let timing = handle.timing();
    let status = match handle.phase() {
        LifecyclePhase::Completion => "completed",
        LifecyclePhase::Cancelled(_) => "cancelled",
        LifecyclePhase::Error(_) => "failed",
        _ => "unsettled",
    };

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({
            "status": status,
            "document": String::from_utf8_lossy(&document),
            "time_to_shell_ms": timing.time_to_shell().map(|d| d.as_millis() as u64),
            "time_to_all_ready_ms": timing.time_to_all_ready().map(|d| d.as_millis() as u64),
        }));
    } else {
        eprintln!();
        ctx.output.kv("status", &status_badge(status));
        ctx.output.kv("shell", &format_millis(timing.time_to_shell()));
        ctx.output
            .kv("all ready", &format_millis(timing.time_to_all_ready()));
    }

    outcome.map_err(|err| anyhow::anyhow!("Streamed render failed: {}", err))
}

/// Parse `key=value` pairs into page metadata.
fn parse_meta(pairs: &[String]) -> Result<Meta> {
    let mut meta = Meta::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid --meta '{}', expected key=value", pair);
        };
        if key.trim().is_empty() {
            bail!("Invalid --meta '{}', key is empty", pair);
        }
        meta.insert(key.trim().to_string(), value.to_string());
    }
    Ok(meta)
}

fn data_source(value: Value, delay: Option<Duration>) -> DataSource<Value> {
    match delay {
        Some(delay) => DataSource::future(async move {
            tokio::time::sleep(delay).await;
            Ok(value)
        }),
        None => DataSource::value(value),
    }
}

/// Page markup for the given data, or a loading placeholder.
fn view_markup(data: Option<&Value>) -> String {
    match data {
        None => "<main><p>Loading…</p></main>".to_string(),
        Some(value) => {
            let title = value
                .get("title")
                .and_then(Value::as_str)
                .map(|t| format!("<h1>{}</h1>", escape_html(t)))
                .unwrap_or_default();
            let pretty = serde_json::to_string_pretty(value).unwrap_or_default();
            format!("<main>{}<pre>{}</pre></main>", title, escape_html(&pretty))
        }
    }
}
