//! TSM exporter
//! Serves Prometheus metrics for IBM Spectrum Protect servers queried through dsmadmc

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tsm_exporter::{create_router, AppState, CollectorRegistry, Config, Dsmadmc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Prometheus exporter for IBM Spectrum Protect (TSM)
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the target configuration file
    #[arg(long = "config.file", default_value = "tsm_exporter.yaml")]
    config_file: PathBuf,

    /// Address to listen on for web requests
    #[arg(long = "web.listen-address", default_value = "0.0.0.0:9421")]
    listen_address: SocketAddr,

    /// Path to the dsmadmc executable
    #[arg(long = "path.dsmadmc", default_value = "dsmadmc")]
    dsmadmc: PathBuf,

    /// Timeout in seconds for a single dsmadmc invocation
    #[arg(long = "dsmadmc.timeout", default_value_t = 5)]
    dsmadmc_timeout: u64,

    /// Directory dsmadmc writes its own error log into
    #[arg(long = "dsm.log-dir", env = "DSM_LOG", default_value = "/tmp")]
    dsm_log_dir: PathBuf,

    /// Enable collectors that are disabled by default
    #[arg(long = "collector.enable", value_delimiter = ',')]
    enable: Vec<String>,

    /// Disable collectors that are enabled by default
    #[arg(long = "collector.disable", value_delimiter = ',')]
    disable: Vec<String>,

    /// Log output format
    #[arg(long = "log.format", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

/// Initialize tracing/logging
fn init_tracing(format: LogFormat) {
    let json = format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tsm_exporter=info,tower_http=info".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

fn collector_registry(args: &Args) -> CollectorRegistry {
    let mut registry = CollectorRegistry::with_defaults();
    for (names, enabled) in [(&args.enable, true), (&args.disable, false)] {
        for name in names {
            if !registry.set_enabled(name, enabled) {
                warn!("Unknown collector {}", name);
            }
        }
    }
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting tsm_exporter {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_file(&args.config_file)
        .with_context(|| format!("Failed to load {}", args.config_file.display()))?;
    let collectors = collector_registry(&args);
    let enabled: Vec<&str> = collectors.names().filter(|n| collectors.is_enabled(n)).collect();
    info!("Enabled collectors: {}", enabled.join(","));

    let executor = Dsmadmc::new(
        &args.dsmadmc,
        Duration::from_secs(args.dsmadmc_timeout),
        &args.dsm_log_dir,
    );
    let state = Arc::new(AppState::new(config, collectors, Arc::new(executor)));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(args.listen_address)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen_address))?;
    info!("Listening on {}", args.listen_address);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags() {
        let args = Args::parse_from(["tsm_exporter"]);
        assert_eq!(args.listen_address.port(), 9421);
        assert_eq!(args.dsmadmc_timeout, 5);
        assert_eq!(args.log_format, LogFormat::Text);
    }

    #[test]
    fn test_collector_overrides() {
        let args = Args::parse_from([
            "tsm_exporter",
            "--collector.enable=occupancy,volumeusage",
            "--collector.disable",
            "summary",
            "--log.format",
            "json",
        ]);
        let registry = collector_registry(&args);
        assert!(registry.is_enabled("occupancy"));
        assert!(registry.is_enabled("volumeusage"));
        assert!(!registry.is_enabled("summary"));
        assert!(registry.is_enabled("db"));
        assert_eq!(args.log_format, LogFormat::Json);
    }
}
