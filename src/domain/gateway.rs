//! Boundary to the external state store.
//!
//! The bridge never owns state; it resolves, reads, writes and subscribes
//! through a [`StateGateway`]. Implementations deliver change events on a
//! [`tokio::sync::broadcast`] channel obtained from [`StateGateway::changes`].

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::pattern::PatternError;
use super::state_record::{StateChange, StateRecord};

/// Failure reported by the state store.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The supplied pattern is not acceptable to the store.
    #[error(transparent)]
    InvalidPattern(#[from] PatternError),

    /// The store refused a write.
    #[error("write to {id} rejected: {reason}")]
    WriteRejected {
        /// Target state id.
        id: String,
        /// Store-provided reason.
        reason: String,
    },

    /// The store holds as many subscriptions as it accepts.
    #[error("subscription limit of {0} patterns reached")]
    SubscriptionLimit(usize),

    /// The store could not be reached or answered with an error.
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

/// Operations the bridge needs from the state store.
///
/// All methods may suspend. A hang in one call stalls only the request that
/// issued it.
#[async_trait]
pub trait StateGateway: Send + Sync + fmt::Debug {
    /// Returns every known id matching `pattern`.
    async fn resolve_ids(&self, pattern: &str) -> Result<Vec<String>, GatewayError>;

    /// Reads the current record for `id`, or `None` if it does not exist.
    async fn read_state(&self, id: &str) -> Result<Option<StateRecord>, GatewayError>;

    /// Writes `value` with acknowledgement flag `ack` to `id`.
    async fn write_state(&self, id: &str, value: Value, ack: bool) -> Result<(), GatewayError>;

    /// Asks the store to emit change events for ids matching `pattern`.
    async fn subscribe(&self, pattern: &str) -> Result<(), GatewayError>;

    /// Returns a receiver for all future change events.
    fn changes(&self) -> broadcast::Receiver<StateChange>;
}
