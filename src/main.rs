//! echoframe - Length-prefixed framed stream echo server
//!
//! Accepts TCP connections and echoes each length-prefixed frame back on the
//! connection it arrived on.

use echoframe_server::{Config, Server, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if ECHOFRAME_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("ECHOFRAME_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Starting echoframe server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Idle timeout: {}s", config.network.idle_timeout_secs);
    tracing::info!("  Max connections: {}", config.network.max_connections);
    if config.limits.is_unlimited() {
        tracing::warn!("  Max frame size: unlimited");
    } else {
        tracing::info!("  Max frame size: {} bytes", config.limits.max_frame_size);
    }
    tracing::info!("  Reply mode: {:?}", config.limits.reply_mode);

    let server = Arc::new(Server::new(ServerConfig::from(&config)));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown); a bind failure is fatal
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
