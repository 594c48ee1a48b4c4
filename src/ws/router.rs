//! Dispatch of client requests.
//!
//! [`RequestRouter`] decodes one inbound text frame and produces at most one
//! reply for the originating session. Nothing here can fail the connection:
//! malformed frames are dropped and gateway errors become replies or logs.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::messages::{ClientMessage, Inbound, ServerMessage};
use super::session::Session;
use crate::config::UnknownRequestPolicy;
use crate::domain::{PatternCache, StateGateway};
use crate::service::snapshot::read_record;
use crate::service::structure::StructureStore;

/// Handles `get`, `subscribe`, `setState` and `getStructure` requests.
#[derive(Debug)]
pub struct RequestRouter {
    gateway: Arc<dyn StateGateway>,
    patterns: PatternCache,
    structure: Option<Arc<StructureStore>>,
    allow_write: bool,
    unknown_requests: UnknownRequestPolicy,
}

impl RequestRouter {
    /// Creates a router over `gateway`.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn StateGateway>,
        structure: Option<Arc<StructureStore>>,
        allow_write: bool,
        unknown_requests: UnknownRequestPolicy,
    ) -> Self {
        Self {
            gateway,
            patterns: PatternCache::new(),
            structure,
            allow_write,
            unknown_requests,
        }
    }

    /// Decodes and handles one text frame from `session`.
    pub async fn handle_text(&self, session: &Session, text: &str) -> Option<ServerMessage> {
        match ClientMessage::decode(text) {
            Inbound::Malformed => {
                debug!(session_id = %session.id(), "dropping malformed frame");
                None
            }
            Inbound::Request(msg) => self.dispatch(session, msg).await,
        }
    }

    /// Handles a decoded request.
    pub async fn dispatch(&self, session: &Session, msg: ClientMessage) -> Option<ServerMessage> {
        match msg {
            ClientMessage::Get { ids } => Some(self.get(ids).await),
            ClientMessage::Subscribe { ids } => Some(self.subscribe(session, ids).await),
            ClientMessage::SetState { id, value, ack } => self.set_state(id, value, ack).await,
            ClientMessage::GetStructure => match &self.structure {
                Some(store) => Some(ServerMessage::Structure {
                    data: store.current().await,
                }),
                None => self.unrecognized(session),
            },
            ClientMessage::Unrecognized => self.unrecognized(session),
        }
    }

    async fn get(&self, ids: Vec<String>) -> ServerMessage {
        let mut items = Vec::with_capacity(ids.len());
        for id in &ids {
            items.push(read_record(self.gateway.as_ref(), id).await);
        }
        ServerMessage::GetResult { items }
    }

    async fn subscribe(&self, session: &Session, ids: Vec<String>) -> ServerMessage {
        for id in &ids {
            if !session.can_subscribe(id) {
                warn!(session_id = %session.id(), pattern = %id, "subscription limit reached");
                continue;
            }
            if let Err(e) = self.gateway.subscribe(id).await {
                debug!(session_id = %session.id(), pattern = %id, error = %e, "client subscribe failed");
            }
            match self.patterns.get_or_compile(id) {
                Ok(pattern) => {
                    let _ = session.subscribe(pattern);
                }
                Err(e) => debug!(session_id = %session.id(), error = %e, "unusable subscribe pattern"),
            }
        }
        ServerMessage::Subscribed { ids }
    }

    async fn set_state(&self, id: String, value: Value, ack: bool) -> Option<ServerMessage> {
        if !self.allow_write {
            debug!(state_id = %id, "write disabled, ignoring setState");
            return None;
        }
        match self.gateway.write_state(&id, value, ack).await {
            Ok(()) => Some(ServerMessage::SetResult {
                ok: true,
                id,
                error: None,
            }),
            Err(e) => {
                warn!(state_id = %id, error = %e, "setState failed");
                Some(ServerMessage::SetResult {
                    ok: false,
                    id,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    fn unrecognized(&self, session: &Session) -> Option<ServerMessage> {
        debug!(session_id = %session.id(), "unrecognized request");
        match self.unknown_requests {
            UnknownRequestPolicy::Reply => Some(ServerMessage::unknown_request()),
            UnknownRequestPolicy::Ignore => None,
        }
    }
}
