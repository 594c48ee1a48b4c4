//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::BridgeMode;
use crate::service::snapshot::SnapshotBuilder;
use crate::service::structure::StructureStore;
use crate::ws::messages::ServerMessage;
use crate::ws::registry::SessionRegistry;
use crate::ws::router::RequestRouter;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Live sessions.
    pub sessions: Arc<SessionRegistry>,
    /// Request dispatcher shared by all connections.
    pub router: Arc<RequestRouter>,
    /// Builds the initial snapshot in state mode.
    pub snapshots: SnapshotBuilder,
    /// Structure document, when configured.
    pub structure: Option<Arc<StructureStore>>,
    /// Required access token; empty disables the check.
    pub token: Arc<str>,
    /// Initial payload mode.
    pub mode: BridgeMode,
    /// Depth of each session's outbound queue.
    pub outbound_capacity: usize,
    /// When the bridge started.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Builds the message that follows `hello` on a new connection.
    ///
    /// Returns `None` in structure mode without a structure source.
    pub async fn initial_payload(&self) -> Option<ServerMessage> {
        match self.mode {
            BridgeMode::State => Some(ServerMessage::Snapshot {
                items: self.snapshots.build().await,
            }),
            BridgeMode::Structure => match &self.structure {
                Some(store) => Some(ServerMessage::Structure {
                    data: store.current().await,
                }),
                None => None,
            },
        }
    }
}
