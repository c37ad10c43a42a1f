//! funsync - Main entry point
//!
//! Plays a video in mpv and keeps haptic devices in sync with the
//! accompanying funscript.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use funsync::bus::{self, CommandMessage};
use funsync::config::Config;
use funsync::device::{DeviceManager, IntifaceClient};
use funsync::playback::{InstructionMap, SyncSession};
use funsync::player::Player;
use funsync::script::{self, ActionTimeline};

/// Command-line arguments for funsync
#[derive(Parser, Debug)]
#[command(name = "funsync")]
#[command(about = "Funscript playback synchronizer for mpv and Intiface devices")]
#[command(version)]
struct Args {
    /// Video file to play
    video: PathBuf,

    /// Funscript to sync against (defaults to the video path with a
    /// .funscript extension)
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Websocket address of the Intiface Central server
    #[arg(long, env = "FUNSYNC_SERVER")]
    server: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "FUNSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the mpv binary
    #[arg(long)]
    mpv_path: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let default_filter = if args.debug {
        "funsync=debug"
    } else {
        "funsync=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting funsync v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Resolve configuration: CLI > environment > file > defaults
    let mut config =
        Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(server) = args.server {
        config.server_address = server;
    }
    if let Some(mpv_path) = args.mpv_path {
        config.mpv_path = mpv_path;
    }

    // Load and index the script before anything is spawned
    let script_path = args
        .script
        .clone()
        .unwrap_or_else(|| script::script_path_for(&args.video));
    info!("Loading script {}", script_path.display());
    let funscript = script::load_script(&script_path).context("Failed to load funscript")?;
    let timeline =
        Arc::new(ActionTimeline::build(funscript.actions).context("Failed to index funscript")?);
    info!("Indexed {} action(s)", timeline.len());

    // Bus between the playback feed and the device manager
    let (command_tx, command_rx) = bus::channel();

    // Device subsystem; a connect failure only disables sync
    let server_address = config.server_address.clone();
    let manager_config = config.clone();
    let device_task = tokio::spawn(async move {
        match IntifaceClient::connect(&server_address).await {
            Ok(client) => {
                DeviceManager::new(client, command_rx, &manager_config)
                    .run()
                    .await
            }
            Err(e) => {
                error!(
                    "Cannot reach device server: {}; playing the video without sync",
                    e
                );
            }
        }
    });

    // Playback: mpv feeds the session until the video ends or a signal
    // tells us to stop
    let map = InstructionMap::new(config.speed_multiplier, config.speed_range);
    let mut session = SyncSession::new(
        timeline,
        map,
        config.jump_threshold_ms,
        command_tx.clone(),
    );

    let player = Player::launch(&config.mpv_path, &args.video)
        .await
        .context("Failed to launch mpv")?;

    tokio::select! {
        result = player.run(|position, idle| session.on_tick(position, idle)) => {
            result.context("Player feed failed")?;
        }
        _ = shutdown_signal() => {}
    }

    // Orderly device shutdown regardless of how playback ended
    command_tx.send(CommandMessage::Shutdown);
    if let Err(e) = device_task.await {
        error!("Device task failed: {}", e);
    }

    info!("Shutdown complete");
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
