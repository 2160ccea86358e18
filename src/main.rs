//! Portal Gatekeeper - request gatekeeper and reverse proxy for the portal
//!
//! Accepts browser and machine traffic, applies the protection pipeline
//! and relays everything without a local handler to the upstream server.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::{registry::Registry, Layer};

use portal_gatekeeper::{
    api,
    config::{LogFormat, LogTarget, LoggingConfig},
    services::access_log::AccessLog,
    AppConfig, AppState,
};

/// How long the access log writer may take to drain on shutdown
const ACCESS_LOG_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    // Check for --help flag
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }

    // Check for --version flag
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("Portal Gatekeeper {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if args.iter().any(|arg| arg == "--print-default-config") {
        print!("{}", AppConfig::default().to_yaml()?);
        return Ok(());
    }

    // Load configuration first (before logging, so we know log format)
    let config = AppConfig::load().context("Failed to load configuration")?;

    // The guards must live until exit so buffered lines are flushed
    let _log_guards = init_logging(&config.logging);

    info!("Portal Gatekeeper starting up");
    match config.upstream.url {
        Some(ref url) => info!("Upstream server: {}", url),
        None => warn!("No upstream server configured, proxied routes will answer 503"),
    }
    if config.session.effective_secret().is_none() {
        warn!("No session secret configured, session signatures are NOT verified");
    }

    let (access_log, access_log_writer) = AccessLog::spawn(config.logging.access_log_capacity);

    let state = AppState::new(config.clone(), access_log.clone())
        .context("Failed to initialize application state")?;
    let app = api::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address configuration")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    let dropped = access_log.dropped();
    drop(access_log);
    if dropped > 0 {
        warn!(dropped, "Access log records were dropped under load");
    }
    if tokio::time::timeout(ACCESS_LOG_DRAIN_TIMEOUT, access_log_writer)
        .await
        .is_err()
    {
        warn!("Access log writer did not drain in time");
    }

    info!("Portal Gatekeeper stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received, draining connections");
}

/// Initialize the logging/tracing infrastructure.
///
/// Every sink goes through a lossy non-blocking writer: when a sink falls
/// behind, lines are dropped rather than stalling requests.
fn init_logging(log_config: &LoggingConfig) -> Vec<WorkerGuard> {
    use tracing_subscriber::{prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_config.level));

    let mut guards = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if matches!(log_config.target, LogTarget::Console | LogTarget::Both) {
        let (writer, guard) = NonBlockingBuilder::default()
            .lossy(true)
            .finish(std::io::stdout());
        guards.push(guard);
        layers.push(format_layer(log_config.format, writer));
    }

    if matches!(log_config.target, LogTarget::File | LogTarget::Both) {
        let (writer, guard) = create_file_writer(log_config);
        guards.push(guard);
        layers.push(format_layer(log_config.format, writer));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    guards
}

/// Create a file writer with optional daily rotation
fn create_file_writer(log_config: &LoggingConfig) -> (NonBlocking, WorkerGuard) {
    // Ensure log directory exists
    if let Err(e) = std::fs::create_dir_all(&log_config.log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            log_config.log_dir, e
        );
    }

    let file_appender = if log_config.daily_rotation {
        tracing_appender::rolling::daily(&log_config.log_dir, &log_config.log_prefix)
    } else {
        tracing_appender::rolling::never(&log_config.log_dir, &log_config.log_prefix)
    };

    NonBlockingBuilder::default().lossy(true).finish(file_appender)
}

fn format_layer(format: LogFormat, writer: NonBlocking) -> Box<dyn Layer<Registry> + Send + Sync> {
    use tracing_subscriber::fmt;

    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(writer)
            .boxed(),
    }
}

fn print_help() {
    println!(
        r#"Portal Gatekeeper {}

Request gatekeeper and reverse proxy for the portal.

USAGE:
    portal-gatekeeper [OPTIONS]

OPTIONS:
    -h, --help                  Print this help message
    -V, --version               Print version information
    --print-default-config      Print the default configuration as YAML

ENVIRONMENT:
    PORTAL_CONFIG               Path to the configuration file
    PORTAL_HOST                 Listen address (default: 127.0.0.1)
    PORTAL_PORT                 Listen port (default: 8080)
    PORTAL_UPSTREAM_URL         Base URL of the upstream server
    PORTAL_SESSION_SECRET       Shared secret for session token signatures
    PORTAL_SECURE_COOKIES       Mark issued cookies Secure (true/false)
    PORTAL_LOG_FORMAT           Log format: pretty, json or compact
    RUST_LOG                    Log filter (e.g. info, portal_gatekeeper=debug)

CONFIGURATION FILES (first found wins):
    ./config.yaml
    ./config/config.yaml
    /etc/portal-gatekeeper/config.yaml
    ~/.config/portal-gatekeeper/config.yaml
"#,
        env!("CARGO_PKG_VERSION")
    );
}
