//! Live-session registry.
//!
//! [`SessionRegistry`] is the single owner of which sockets are live. The
//! broadcast engine iterates it under a read lock, so a session added or
//! removed concurrently is either fully included in a fan-out or deferred
//! to the next event.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::session::Session;
use crate::domain::SessionId;

/// Set of connected sessions, keyed by [`SessionId`].
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    /// Set by [`SessionRegistry::terminate_all`]; only read or written
    /// under the `sessions` write lock.
    closed: AtomicBool,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session to the live set.
    ///
    /// Returns `false` once the registry has been shut down; the caller
    /// must then terminate the session itself.
    pub async fn add(&self, session: Arc<Session>) -> bool {
        let id = session.id();
        let mut map = self.sessions.write().await;
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let _ = map.insert(id, session);
        debug!(session_id = %id, sessions = map.len(), "session registered");
        true
    }

    /// Removes a session. Returns `false` if it was already gone.
    pub async fn remove(&self, id: SessionId) -> bool {
        let mut map = self.sessions.write().await;
        let removed = map.remove(&id).is_some();
        if removed {
            debug!(session_id = %id, sessions = map.len(), "session removed");
        }
        removed
    }

    /// Returns `true` if `id` is live.
    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Pushes `frame` to every live session accepted by `eligible`.
    ///
    /// Delivery failures are per session and never stop the fan-out.
    /// Returns the number of sessions the frame was queued for.
    pub async fn fan_out<F>(&self, frame: &Utf8Bytes, eligible: F) -> usize
    where
        F: Fn(&Session) -> bool,
    {
        let map = self.sessions.read().await;
        let mut delivered = 0;
        for session in map.values() {
            if !eligible(session) {
                continue;
            }
            if session.push_event(frame.clone()) {
                delivered += 1;
            } else {
                debug!(session_id = %session.id(), "dropped event for session");
            }
        }
        delivered
    }

    /// Returns `true` once [`SessionRegistry::terminate_all`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Terminates every session, empties the registry and refuses further
    /// additions.
    ///
    /// Returns the number of sessions terminated.
    pub async fn terminate_all(&self) -> usize {
        let drained: Vec<Arc<Session>> = {
            let mut map = self.sessions.write().await;
            self.closed.store(true, Ordering::Release);
            map.drain().map(|(_, s)| s).collect()
        };
        for session in &drained {
            session.terminate();
        }
        if !drained.is_empty() {
            info!(sessions = drained.len(), "terminated all sessions");
        }
        drained.len()
    }
}
