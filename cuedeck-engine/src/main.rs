//! Cuedeck switch engine - Main entry point
//!
//! Runs the source-switching engine with its HTTP/SSE control surface and
//! the default tokio-backed collaborators (wall-clock timers and transition
//! clock, headless playback). Hosts with a real media backend feed telemetry
//! through `/switcher/telemetry` or embed the engine as a library.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cuedeck_engine::api;
use cuedeck_engine::config::{Config, ConfigOverrides};
use cuedeck_engine::state::SharedState;
use cuedeck_engine::switcher::drivers::{
    ClockTransitionRenderer, HeadlessPlayback, TokioTimerService,
};
use cuedeck_engine::switcher::{Collaborators, SwitchEngine};

/// Command-line arguments for cuedeck-engine
#[derive(Parser, Debug)]
#[command(name = "cuedeck-engine")]
#[command(about = "Live media source-switching engine")]
#[command(version)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CUEDECK_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "CUEDECK_PORT")]
    port: Option<u16>,

    /// SQLite database path (overrides config file)
    #[arg(short, long, env = "CUEDECK_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cuedeck_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration (TOML + database settings)
    let config = Config::load(
        args.config.as_ref(),
        ConfigOverrides {
            database_path: args.database,
            port: args.port,
        },
    )
    .await
    .context("Failed to load configuration")?;

    info!("Starting Cuedeck engine on port {}", config.port);
    info!("Database: {}", config.database_path.display());

    let state = Arc::new(SharedState::new());

    // Construct the engine with the default collaborator drivers
    let (engine, handle) = SwitchEngine::new(
        config.db_pool.clone(),
        Arc::clone(&state),
        |tx| Collaborators {
            playback: Box::new(HeadlessPlayback),
            timers: Box::new(TokioTimerService::new(tx.clone())),
            renderer: Box::new(ClockTransitionRenderer::new(tx)),
        },
        &config.runtime,
    )
    .await
    .context("Failed to initialize switch engine")?;
    info!("Switch engine initialized");

    // Run the engine actor in the background
    tokio::spawn(engine.run());

    // Serve the HTTP API until shutdown
    tokio::select! {
        result = api::run(&config, state, handle) => {
            result.context("HTTP server error")?;
        }
        _ = shutdown_signal() => {
            info!("Shutting down");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
