//! Bridge startup and shutdown.
//!
//! [`start`] wires the configured whitelist, the broadcast engine and the
//! Axum server around a [`StateGateway`], binds the listener and returns a
//! [`BridgeHandle`] used to inspect and stop the running bridge.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api;
use crate::app_state::AppState;
use crate::config::BridgeConfig;
use crate::domain::{StateGateway, Whitelist};
use crate::error::BridgeError;
use crate::service::{BroadcastEngine, SnapshotBuilder, StructureStore};
use crate::ws::handler::ws_handler;
use crate::ws::registry::SessionRegistry;
use crate::ws::router::RequestRouter;

/// Builds the complete router: WebSocket upgrade at `/` and `/ws`, plus
/// the HTTP side endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .merge(api::build_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Starts the bridge.
///
/// Subscribes the gateway to the whitelist before the listener accepts
/// its first client, so every later change is seen by the broadcast
/// engine.
///
/// # Errors
///
/// Returns [`BridgeError::Config`] or [`BridgeError::Pattern`] for invalid
/// configuration, an error from loading the structure document, and
/// [`BridgeError::Bind`] if the listening port cannot be bound.
pub async fn start(
    config: BridgeConfig,
    gateway: Arc<dyn StateGateway>,
) -> Result<BridgeHandle, BridgeError> {
    config.validate()?;

    let whitelist = Arc::new(Whitelist::new(&config.expose_states)?);
    let structure = match &config.structure {
        Some(cfg) => Some(Arc::new(StructureStore::load(cfg).await?)),
        None => None,
    };

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(|source| BridgeError::Bind {
            addr: config.listen_addr,
            source,
        })?;
    let local_addr = listener.local_addr()?;

    let sessions = Arc::new(SessionRegistry::new());
    let engine = BroadcastEngine::new(
        Arc::clone(&sessions),
        Arc::clone(&whitelist),
        config.delivery,
    );
    let changes = gateway.changes();
    let subscribed = engine.subscribe_whitelist(gateway.as_ref()).await;

    let shutdown = CancellationToken::new();
    let broadcast = engine.spawn(changes, shutdown.child_token());

    let state = AppState {
        sessions: Arc::clone(&sessions),
        router: Arc::new(RequestRouter::new(
            Arc::clone(&gateway),
            structure.clone(),
            config.allow_write,
            config.unknown_requests,
        )),
        snapshots: SnapshotBuilder::new(Arc::clone(&gateway), whitelist),
        structure,
        token: Arc::from(config.token.as_str()),
        mode: config.mode,
        outbound_capacity: config.outbound_capacity,
        started_at: Utc::now(),
    };

    let app = build_router(state);
    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await
    });

    info!(
        addr = %local_addr,
        patterns = subscribed,
        auth = config.auth_required(),
        allow_write = config.allow_write,
        mode = ?config.mode,
        "WebSocket server listening"
    );

    Ok(BridgeHandle {
        local_addr,
        sessions,
        shutdown,
        tasks: Mutex::new(Some((server, broadcast))),
    })
}

type ServerTask = JoinHandle<std::io::Result<()>>;

/// Handle to a running bridge.
#[derive(Debug)]
pub struct BridgeHandle {
    local_addr: SocketAddr,
    sessions: Arc<SessionRegistry>,
    shutdown: CancellationToken,
    tasks: Mutex<Option<(ServerTask, JoinHandle<()>)>>,
}

impl BridgeHandle {
    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Live-session registry.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Returns `true` once [`BridgeHandle::shutdown`] has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stops the bridge.
    ///
    /// Stops accepting connections, forcibly terminates every session,
    /// stops the broadcast engine and waits for the listening socket to
    /// close. Errors during teardown are logged and swallowed. Calling it
    /// again is a no-op.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let terminated = self.sessions.terminate_all().await;

        let Some((server, broadcast)) = self.tasks.lock().take() else {
            return;
        };
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "server exited with error"),
            Err(e) => warn!(error = %e, "server task failed"),
        }
        if let Err(e) = broadcast.await {
            warn!(error = %e, "broadcast task failed");
        }
        info!(terminated, "bridge stopped");
    }
}
