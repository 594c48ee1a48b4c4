//! state-bridge server entry point.
//!
//! Runs the bridge over the built-in in-memory state store until Ctrl-C or
//! SIGTERM, then terminates all clients and closes the listener.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use state_bridge::config::BridgeConfig;
use state_bridge::domain::{MemoryStateStore, StateGateway};
use state_bridge::error::BridgeError;
use state_bridge::server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = BridgeConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(addr = %config.listen_addr, "starting state-bridge");

    // Build the state store
    let store = MemoryStateStore::new(config.change_feed_capacity);
    if let Some(path) = &config.seed_file {
        let seed = load_seed(path).await?;
        tracing::info!(path = %path.display(), states = seed.len(), "seeded state store");
        store.seed(seed).await;
    }
    let gateway: Arc<dyn StateGateway> = Arc::new(store);

    // Start server
    let bridge = server::start(config, gateway).await?;

    shutdown_signal().await;
    tracing::info!("shutdown requested");
    bridge.shutdown().await;

    Ok(())
}

/// Reads a JSON object mapping state ids to initial values.
async fn load_seed(path: &Path) -> Result<Map<String, Value>, BridgeError> {
    let text = tokio::fs::read_to_string(path).await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(BridgeError::Config(format!(
            "seed file {} must contain a JSON object",
            path.display()
        ))),
        Err(e) => Err(BridgeError::Config(format!(
            "seed file {}: {e}",
            path.display()
        ))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
