//! In-process state store used when the bridge runs standalone.
//!
//! [`MemoryStateStore`] keeps every state in an ordered map behind a
//! [`tokio::sync::RwLock`] and publishes changes on a broadcast channel.
//! Like the host store it mirrors, change events are only emitted for ids
//! that match a pattern previously passed to [`StateGateway::subscribe`].

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock as SyncRwLock;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};

use super::gateway::{GatewayError, StateGateway};
use super::pattern::IdPattern;
use super::{StateChange, StateRecord};

/// Distinct subscription patterns a store accepts by default.
pub const DEFAULT_SUBSCRIPTION_LIMIT: usize = 4096;

/// Patterns the store emits changes for.
///
/// Literal ids are looked up in a set; only wildcard patterns are scanned.
/// A catch-all pattern replaces everything else.
#[derive(Debug, Default)]
struct Subscriptions {
    all: bool,
    exact: HashSet<String>,
    wildcards: Vec<IdPattern>,
}

impl Subscriptions {
    fn matches(&self, id: &str) -> bool {
        self.all || self.exact.contains(id) || self.wildcards.iter().any(|p| p.matches(id))
    }

    fn len(&self) -> usize {
        usize::from(self.all) + self.exact.len() + self.wildcards.len()
    }

    fn contains(&self, pattern: &IdPattern) -> bool {
        self.all
            || self.exact.contains(pattern.as_str())
            || self.wildcards.iter().any(|p| p.as_str() == pattern.as_str())
    }

    fn add(&mut self, pattern: IdPattern, limit: usize) -> Result<(), GatewayError> {
        if self.contains(&pattern) {
            return Ok(());
        }
        if pattern.matches_all() {
            self.all = true;
            self.exact.clear();
            self.wildcards.clear();
            return Ok(());
        }
        if self.len() >= limit {
            return Err(GatewayError::SubscriptionLimit(limit));
        }
        if pattern.as_str().contains('*') {
            self.wildcards.push(pattern);
        } else {
            let _ = self.exact.insert(pattern.as_str().to_string());
        }
        Ok(())
    }
}

/// Ordered, in-memory implementation of [`StateGateway`].
#[derive(Debug)]
pub struct MemoryStateStore {
    states: RwLock<BTreeMap<String, StateRecord>>,
    subscriptions: SyncRwLock<Subscriptions>,
    subscription_limit: usize,
    changes: broadcast::Sender<StateChange>,
}

impl MemoryStateStore {
    /// Creates an empty store whose change channel holds `feed_capacity`
    /// events. Lagging receivers lose the oldest ones.
    #[must_use]
    pub fn new(feed_capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(feed_capacity.max(1));
        Self {
            states: RwLock::new(BTreeMap::new()),
            subscriptions: SyncRwLock::new(Subscriptions::default()),
            subscription_limit: DEFAULT_SUBSCRIPTION_LIMIT,
            changes,
        }
    }

    /// Caps the number of distinct subscription patterns.
    #[must_use]
    pub fn with_subscription_limit(mut self, limit: usize) -> Self {
        self.subscription_limit = limit;
        self
    }

    /// Loads acknowledged initial values without emitting change events.
    pub async fn seed<I>(&self, values: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let now = now_millis();
        let mut map = self.states.write().await;
        for (id, val) in values {
            let record = StateRecord::new(id.clone(), val, now, now, true);
            map.insert(id, record);
        }
    }

    /// Removes `id` and emits a deletion event if it existed.
    pub async fn delete_state(&self, id: &str) -> bool {
        let removed = self.states.write().await.remove(id).is_some();
        if removed {
            self.publish(StateChange::deleted(id));
        }
        removed
    }

    /// Number of stored states.
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    /// Returns `true` if the store holds no states.
    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }

    /// Number of distinct subscription patterns held.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Sends `change` if its id is subscribed. No receivers is not an error.
    fn publish(&self, change: StateChange) {
        if self.subscriptions.read().matches(&change.id) {
            let _ = self.changes.send(change);
        }
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl StateGateway for MemoryStateStore {
    async fn resolve_ids(&self, pattern: &str) -> Result<Vec<String>, GatewayError> {
        let pat = IdPattern::compile(pattern)?;
        let map = self.states.read().await;
        Ok(map.keys().filter(|id| pat.matches(id)).cloned().collect())
    }

    async fn read_state(&self, id: &str) -> Result<Option<StateRecord>, GatewayError> {
        Ok(self.states.read().await.get(id).cloned())
    }

    async fn write_state(&self, id: &str, value: Value, ack: bool) -> Result<(), GatewayError> {
        if id.trim().is_empty() {
            return Err(GatewayError::WriteRejected {
                id: id.to_string(),
                reason: "state id must not be empty".to_string(),
            });
        }

        let now = now_millis();
        let record = {
            let mut map = self.states.write().await;
            let lc = match map.get(id) {
                Some(prev) if prev.val == value => prev.lc.unwrap_or(now),
                _ => now,
            };
            let record = StateRecord::new(id, value, now, lc, ack);
            map.insert(id.to_string(), record.clone());
            record
        };

        self.publish(StateChange::updated(record));
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<(), GatewayError> {
        let pat = IdPattern::compile(pattern)?;
        self.subscriptions
            .write()
            .add(pat, self.subscription_limit)
    }

    fn changes(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
