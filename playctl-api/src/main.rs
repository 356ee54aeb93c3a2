//! playctl-api - Main entry point
//!
//! Starts the control server with the in-process player, then runs the state
//! sync loop and the port watcher until Ctrl+C / SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playctl_api::config::{Config, ConfigOverrides, PortSetting};
use playctl_api::engine::LocalPlayer;
use playctl_api::sync::{PortWatcher, SyncLoop};
use playctl_api::ControlServer;

/// Command-line arguments for playctl-api
#[derive(Parser, Debug)]
#[command(name = "playctl-api")]
#[command(about = "Playback control-plane service (HTTP + WebSocket)")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "PLAYCTL_PORT", value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Interface address to bind
    #[arg(long, env = "PLAYCTL_HOST")]
    host: Option<String>,

    /// TOML config file (default: <config dir>/playctl/config.toml)
    #[arg(short, long, env = "PLAYCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PLAYCTL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Initial queue of item ids for the built-in player
    #[arg(long, value_delimiter = ',')]
    queue: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(
        args.config.as_deref(),
        ConfigOverrides {
            port: args.port,
            host: args.host,
            log_level: args.log_level,
        },
    )
    .context("Failed to load configuration")?;

    // Initialize tracing (RUST_LOG wins over the configured level)
    let level = &config.log_level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("playctl_api={level},playctl_common={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting playctl-api v{} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config.config_path {
        Some(path) => info!("Configuration file: {}", path.display()),
        None => warn!("No configuration file found, using defaults and command-line values"),
    }
    info!(
        "Poll interval {:?}, config check {:?}, delegation timeout {:?}",
        config.state_poll_interval, config.config_check_interval, config.delegation_timeout
    );

    let engine = Arc::new(LocalPlayer::spawn(args.queue));
    let server = Arc::new(ControlServer::new(engine, config.server_options()));

    server
        .start(config.port)
        .await
        .with_context(|| format!("Failed to start control server on port {}", config.port))?;

    let shutdown = CancellationToken::new();

    let sync = SyncLoop::new(&server, config.state_poll_interval, config.delegation_timeout);
    let sync_task = tokio::spawn(sync.run(shutdown.clone()));

    let setting = Arc::new(PortSetting::new(config.port));
    let mut watcher =
        PortWatcher::new(Arc::clone(&server), setting, config.config_check_interval);
    if let Some(path) = config.watched_file() {
        watcher = watcher.with_config_file(path.to_path_buf(), i64::from(config.port));
    }
    let watcher_task = tokio::spawn(watcher.run(shutdown.clone()));

    shutdown_signal().await;

    shutdown.cancel();
    let _ = tokio::join!(sync_task, watcher_task);
    server.stop().await;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
