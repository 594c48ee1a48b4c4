//! Fan-out of state changes to connected sessions.
//!
//! [`BroadcastEngine`] consumes the gateway's change feed, drops deletions
//! and ids outside the whitelist, serializes each surviving change once and
//! pushes the frame to every eligible session in the [`SessionRegistry`].

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DeliveryPolicy;
use crate::domain::{StateChange, StateGateway, Whitelist};
use crate::ws::messages::ServerMessage;
use crate::ws::registry::SessionRegistry;

/// Filters change events and delivers them to sessions.
#[derive(Debug, Clone)]
pub struct BroadcastEngine {
    sessions: Arc<SessionRegistry>,
    whitelist: Arc<Whitelist>,
    delivery: DeliveryPolicy,
}

impl BroadcastEngine {
    /// Creates an engine delivering into `sessions`.
    #[must_use]
    pub fn new(
        sessions: Arc<SessionRegistry>,
        whitelist: Arc<Whitelist>,
        delivery: DeliveryPolicy,
    ) -> Self {
        Self {
            sessions,
            whitelist,
            delivery,
        }
    }

    /// Subscribes the gateway to every whitelist pattern.
    ///
    /// A failing pattern is logged and skipped. Returns the number of
    /// patterns subscribed.
    pub async fn subscribe_whitelist(&self, gateway: &dyn StateGateway) -> usize {
        let mut subscribed = 0;
        for pattern in self.whitelist.effective_patterns() {
            match gateway.subscribe(&pattern).await {
                Ok(()) => {
                    info!(pattern = %pattern, "subscribed");
                    subscribed += 1;
                }
                Err(e) => warn!(pattern = %pattern, error = %e, "subscribe failed"),
            }
        }
        subscribed
    }

    /// Delivers one change. Returns the number of sessions it was queued for.
    pub async fn dispatch(&self, change: StateChange) -> usize {
        let StateChange { id, state } = change;
        let Some(record) = state else {
            debug!(state_id = %id, "ignoring deletion");
            return 0;
        };
        if !self.whitelist.allows(&id) {
            return 0;
        }

        let frame = match ServerMessage::State(record).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(state_id = %id, error = %e, "failed to serialize state");
                return 0;
            }
        };

        let recipients = match self.delivery {
            DeliveryPolicy::Global => self.sessions.fan_out(&frame, |_| true).await,
            DeliveryPolicy::Subscribed => {
                self.sessions
                    .fan_out(&frame, |s| s.is_subscribed(&id))
                    .await
            }
        };
        debug!(state_id = %id, recipients, "broadcast state");
        recipients
    }

    /// Runs the dispatch loop until `cancel` fires or the feed closes.
    pub fn spawn(
        self,
        mut changes: broadcast::Receiver<StateChange>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    event = changes.recv() => match event {
                        Ok(change) => {
                            let _ = self.dispatch(change).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(lagged = n, "broadcast engine lagged behind change feed");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            debug!("broadcast engine stopped");
        })
    }
}
