//! Bridge runner
//!
//! Entry point for running the bridge with the console chat adapter.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use super::console::ConsolePublisher;
use super::core::Bridge;
use crate::cli::Cli;
use crate::types::{BridgeError, StreamOutcome};

// OpenTelemetry imports (only when feature is enabled)
#[cfg(feature = "otel")]
use opentelemetry::global;
#[cfg(feature = "otel")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "otel")]
use opentelemetry_sdk::trace::SdkTracerProvider;

// Global storage for OpenTelemetry provider (for proper shutdown)
#[cfg(feature = "otel")]
static OTEL_PROVIDER: std::sync::OnceLock<SdkTracerProvider> = std::sync::OnceLock::new();

/// Shutdown OpenTelemetry provider (flush all pending spans)
///
/// This should be called before the application exits to ensure all
/// telemetry data is properly flushed to the backend.
#[cfg(feature = "otel")]
pub fn shutdown_otel() {
    if let Some(provider) = OTEL_PROVIDER.get() {
        tracing::info!("Shutting down OpenTelemetry provider...");
        if let Err(e) = provider.shutdown() {
            eprintln!("Failed to shutdown OpenTelemetry provider: {:?}", e);
        } else {
            tracing::info!("OpenTelemetry provider shutdown complete");
        }
    }
}

/// Shutdown OpenTelemetry provider (no-op when feature is disabled)
#[cfg(not(feature = "otel"))]
pub fn shutdown_otel() {}

/// Initialize OpenTelemetry tracer provider
#[cfg(feature = "otel")]
fn init_otel(endpoint: &str, service_name: &str) -> anyhow::Result<SdkTracerProvider> {
    use opentelemetry_sdk::Resource;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_owned())
                .build(),
        )
        .build();

    global::set_tracer_provider(provider.clone());

    Ok(provider)
}

/// Build an EnvFilter based on CLI args and RUST_LOG environment variable
///
/// Priority: RUST_LOG environment variable > CLI arguments (-v, -vv, -q)
fn build_env_filter(cli: &Cli) -> tracing_subscriber::EnvFilter {
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        if !rust_log.is_empty() {
            return tracing_subscriber::EnvFilter::new(rust_log);
        }
    }

    let level = cli.log_level();
    tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into())
}

/// Install the subscriber with the given fmt layer, plus OTLP export when enabled
fn install_subscriber<L>(cli: &Cli, fmt_layer: L) -> anyhow::Result<()>
where
    L: tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(fmt_layer);

    #[cfg(feature = "otel")]
    {
        if let Some(endpoint) = cli.otel_endpoint.as_deref() {
            let service_name = &cli.otel_service_name;
            eprintln!(
                "OpenTelemetry enabled: endpoint={}, service={}",
                endpoint, service_name
            );

            let provider = init_otel(endpoint, service_name)?;
            let tracer = provider.tracer("copilot-bridge");
            let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

            // Store provider globally for proper shutdown
            drop(OTEL_PROVIDER.set(provider));

            registry
                .with(otel_layer)
                .with(build_env_filter(cli))
                .try_init()?;
            return Ok(());
        }
    }

    registry.with(build_env_filter(cli)).try_init()?;
    Ok(())
}

/// Initialize logging based on CLI arguments
///
/// Diagnostic mode logs to a file; otherwise logs go to stderr, since stdout
/// carries the chat output.
fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    if cli.is_diagnostic() {
        let log_path = cli.log_path();
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(&log_path)?;

        // Output log file location to stderr (user needs to know)
        eprintln!("Diagnostic mode: logging to {}", log_path.display());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false);
        install_subscriber(cli, fmt_layer)
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false);
        install_subscriber(cli, fmt_layer)
    }
}

/// Run the bridge with CLI arguments
///
/// Starts the assistant, relays stdin lines as prompts and stops the
/// assistant on end of input, SIGINT or SIGTERM. A lifecycle error ends
/// the run with an error.
pub async fn run_with_cli(cli: &Cli) -> anyhow::Result<()> {
    let startup_time = Instant::now();

    // Initialize logging first (must happen before any tracing)
    init_logging(cli)?;

    let config = cli.bridge_config();
    config.validate()?;
    if cli.prefix.chars().count() >= config.max_message_length {
        return Err(BridgeError::config_error("prefix leaves no room for output").into());
    }

    {
        let startup_span = tracing::info_span!(
            "bridge_startup",
            version = %env!("CARGO_PKG_VERSION"),
            pid = %std::process::id(),
            diagnostic = %cli.is_diagnostic(),
            otel_enabled = %cli.is_otel_enabled(),
        );
        let _enter = startup_span.enter();

        tracing::info!("========== Copilot Bridge Starting ==========");
        tracing::info!(
            run_id = %uuid::Uuid::new_v4(),
            start_time = %chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            cli_path = %config.cli_path,
            flush_interval_ms = config.flush_interval.as_millis(),
            max_message_length = config.max_message_length,
            json = cli.json,
            "Bridge configuration"
        );
        if cli.is_diagnostic() {
            tracing::info!(log_path = %cli.log_path().display(), "Diagnostic mode enabled");
        }
    }

    let publisher = Arc::new(ConsolePublisher::new(cli.json));
    let bridge = Bridge::new(config, publisher);
    bridge.start().await?;

    tracing::info!(
        startup_ms = startup_time.elapsed().as_millis(),
        "Bridge ready and waiting for prompts"
    );
    if atty::is(atty::Stream::Stdin) {
        eprintln!("Copilot bridge is running. Type a prompt and press Enter.");
        eprintln!("(Press Ctrl+D to finish, Ctrl+C to exit)");
    }

    let result = relay_stdin(&bridge, cli).await;
    bridge.stop().await;

    let uptime = startup_time.elapsed();
    tracing::info!(
        uptime_secs = uptime.as_secs(),
        uptime_ms = uptime.as_millis(),
        "========== Bridge Shutdown Complete =========="
    );
    result
}

/// Relay stdin lines until end of input or a shutdown signal
async fn relay_stdin(bridge: &Bridge, cli: &Cli) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            () = shutdown_signal(&mut sigint, &mut sigterm) => return Ok(()),
        };

        let Some(line) = line else {
            let limit = Duration::from_secs(cli.linger_secs);
            tracing::info!(linger_secs = cli.linger_secs, "End of input, waiting for last answer");
            let shutdown = shutdown_signal(&mut sigint, &mut sigterm);
            if let Some(outcome) = linger(bridge, limit, shutdown).await {
                tracing::debug!(?outcome, "Last stream ended");
            }
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        // Turn errors are already shown inline in place of the answer
        if let Err(e) = bridge.relay_prompt(&line, &cli.prefix).await {
            if e.is_lifecycle_error() {
                return Err(e.into());
            }
        }
    }
}

/// Resolve on the first SIGINT or SIGTERM
async fn shutdown_signal(sigint: &mut Signal, sigterm: &mut Signal) {
    tokio::select! {
        _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down"),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
    }
}

/// Wait up to `limit` for the last answer, giving up early on `shutdown`
///
/// The session lock is released as soon as `shutdown` resolves.
async fn linger(
    bridge: &Bridge,
    limit: Duration,
    shutdown: impl Future<Output = ()>,
) -> Option<StreamOutcome> {
    tokio::select! {
        outcome = bridge.wait_for_stream(limit) => outcome,
        () = shutdown => None,
    }
}
