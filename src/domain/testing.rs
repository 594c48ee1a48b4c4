//! Gateway double that fails on demand.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use super::gateway::{GatewayError, StateGateway};
use super::{MemoryStateStore, StateChange, StateRecord};

/// Wraps a [`MemoryStateStore`] and fails calls that touch listed ids or
/// patterns.
#[derive(Debug, Default)]
pub struct FlakyGateway {
    /// Backing store.
    pub inner: MemoryStateStore,
    failing: Mutex<HashSet<String>>,
    subscribed: Mutex<Vec<String>>,
}

impl FlakyGateway {
    /// Creates an empty gateway that fails nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call naming `key` fail.
    pub fn fail_on(&self, key: &str) {
        self.failing.lock().insert(key.to_string());
    }

    /// Patterns successfully passed to `subscribe`, in call order.
    pub fn subscribed(&self) -> Vec<String> {
        self.subscribed.lock().clone()
    }

    fn check(&self, key: &str) -> Result<(), GatewayError> {
        if self.failing.lock().contains(key) {
            Err(GatewayError::Unavailable(format!("injected failure for {key}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StateGateway for FlakyGateway {
    async fn resolve_ids(&self, pattern: &str) -> Result<Vec<String>, GatewayError> {
        self.check(pattern)?;
        self.inner.resolve_ids(pattern).await
    }

    async fn read_state(&self, id: &str) -> Result<Option<StateRecord>, GatewayError> {
        self.check(id)?;
        self.inner.read_state(id).await
    }

    async fn write_state(&self, id: &str, value: Value, ack: bool) -> Result<(), GatewayError> {
        self.check(id)?;
        self.inner.write_state(id, value, ack).await
    }

    async fn subscribe(&self, pattern: &str) -> Result<(), GatewayError> {
        self.check(pattern)?;
        self.inner.subscribe(pattern).await?;
        self.subscribed.lock().push(pattern.to_string());
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<StateChange> {
        self.inner.changes()
    }
}
