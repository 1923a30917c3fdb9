use anyhow::{Context, Result};
use dotenvy::dotenv;
use forge_hooks::buffer::RingBuffer;
use forge_hooks::config::EngineSettings;
use forge_hooks::handlers::builtin_catalog;
use forge_hooks::hooks::{Dispatcher, HookRegistry, Manifest};
use forge_hooks::telemetry::TelemetryLog;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_logging();

    let settings = Arc::new(EngineSettings::from_env());
    let registry = match init_registry(&settings) {
        Ok(registry) => registry,
        Err(err) => {
            error!(error = %format!("{err:#}"), "Refusing to start with a broken manifest");
            return Err(err);
        }
    };

    let telemetry_path = std::env::current_dir()
        .context("cannot resolve the working directory")?
        .join(&settings.state_dir)
        .join("telemetry.log");
    let telemetry = Arc::new(TelemetryLog::new(
        telemetry_path,
        settings.telemetry_max_entries,
        settings.telemetry_max_lines,
    ));
    let buffer = Arc::new(RingBuffer::new(settings.buffer_capacity));

    let dispatcher = Dispatcher::new(registry, buffer, settings, telemetry);
    info!(
        hooks = dispatcher.registry().len(),
        "Forge hook engine is running..."
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            signal_token.cancel();
        }
    });

    run(&dispatcher, &shutdown).await
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn init_registry(settings: &EngineSettings) -> Result<HookRegistry> {
    let manifest = match &settings.manifest_path {
        Some(path) => Manifest::load(path)
            .with_context(|| format!("loading manifest {}", path.display()))?,
        None => Manifest::builtin().context("loading built-in manifest")?,
    };
    manifest
        .build_registry(&builtin_catalog(), settings.default_hook_timeout())
        .context("resolving manifest handlers")
}

/// One event per stdin line; one output line per resolved outcome.
async fn run(dispatcher: &Dispatcher, shutdown: &CancellationToken) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.next_line() => line.context("reading events from stdin")?,
        };
        let Some(line) = line else {
            info!("Event stream closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        if let Some(output) = dispatcher.dispatch_line(&line).await {
            stdout.write_all(output.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}
