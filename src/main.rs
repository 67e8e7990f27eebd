//! Arena Duel Server - Authoritative two-player arena game server
//!
//! This is the main entry point for the game server. It handles:
//! - WebSocket connections for the lobby and live matches
//! - The hub actor that owns the lobby and hands players to rooms
//! - One room actor per match, ticking the simulation at 60 Hz

mod app;
mod config;
mod game;
mod http;
mod lobby;
mod util;
mod ws;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::{Cli, Config};
use crate::http::build_router;
use crate::lobby::Hub;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Arena Duel Server");
    info!("Server address: {}", config.server_addr);
    if let Some(seed) = config.arena_seed {
        info!(seed, "Using fixed arena seed");
    }

    // Spawn the hub
    let (hub, hub_handle) = Hub::new(config.arena_seed);
    tokio::spawn(hub.run());

    // Build router
    let addr = config.server_addr;
    let router = build_router(AppState::new(config, hub_handle));

    // Start server
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "Failed to bind {}", addr);
            return Err(e.into());
        }
    };

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
