//! Point-in-time snapshots of the whitelisted states.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{StateGateway, StateRecord, Whitelist};

/// Resolves the whitelist through the gateway and reads every match.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    gateway: Arc<dyn StateGateway>,
    whitelist: Arc<Whitelist>,
}

impl SnapshotBuilder {
    /// Creates a builder over `whitelist`.
    #[must_use]
    pub fn new(gateway: Arc<dyn StateGateway>, whitelist: Arc<Whitelist>) -> Self {
        Self { gateway, whitelist }
    }

    /// Builds the snapshot.
    ///
    /// Ids appear in resolution order, first occurrence wins. A pattern that
    /// fails to resolve is skipped; an id that fails to read is reported
    /// with null fields.
    pub async fn build(&self) -> Vec<StateRecord> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for pattern in self.whitelist.effective_patterns() {
            match self.gateway.resolve_ids(&pattern).await {
                Ok(found) => {
                    for id in found {
                        if seen.insert(id.clone()) {
                            ids.push(id);
                        }
                    }
                }
                Err(e) => warn!(pattern = %pattern, error = %e, "failed to resolve pattern"),
            }
        }

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.push(read_record(self.gateway.as_ref(), &id).await);
        }
        debug!(items = items.len(), "snapshot built");
        items
    }
}

/// Reads `id`, substituting [`StateRecord::missing`] for absent or
/// unreadable states.
pub async fn read_record(gateway: &dyn StateGateway, id: &str) -> StateRecord {
    match gateway.read_state(id).await {
        Ok(Some(record)) => record,
        Ok(None) => StateRecord::missing(id),
        Err(e) => {
            warn!(state_id = id, error = %e, "failed to read state");
            StateRecord::missing(id)
        }
    }
}
