//! State records and change events as read from the state store.
//!
//! Field names follow the host store's wire conventions (`val`, `ts`, `lc`,
//! `ack`) so records can be forwarded to clients without reshaping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Point-in-time view of a single state.
///
/// Records are immutable once read; a later change produces a new record.
/// A state that does not exist (or could not be read) is represented by
/// [`StateRecord::missing`], which keeps the id and nulls every other field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// State identifier, e.g. `light.kitchen`.
    pub id: String,
    /// Current value. `null` when unknown.
    #[serde(default)]
    pub val: Value,
    /// Epoch milliseconds of the last write.
    #[serde(default)]
    pub ts: Option<i64>,
    /// Epoch milliseconds of the last value change.
    #[serde(default)]
    pub lc: Option<i64>,
    /// Whether the last write was confirmed by the owning device.
    #[serde(default)]
    pub ack: Option<bool>,
}

impl StateRecord {
    /// Creates a fully populated record.
    #[must_use]
    pub fn new(id: impl Into<String>, val: Value, ts: i64, lc: i64, ack: bool) -> Self {
        Self {
            id: id.into(),
            val,
            ts: Some(ts),
            lc: Some(lc),
            ack: Some(ack),
        }
    }

    /// Creates a placeholder record for an id with no readable state.
    #[must_use]
    pub fn missing(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            val: Value::Null,
            ts: None,
            lc: None,
            ack: None,
        }
    }

    /// Returns `true` if this record carries no state data.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.val.is_null() && self.ts.is_none() && self.lc.is_none() && self.ack.is_none()
    }
}

/// A single entry of the state store's change feed.
///
/// `state` is `None` when the id was deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    /// Id of the changed state.
    pub id: String,
    /// New record, or `None` for a deletion.
    pub state: Option<StateRecord>,
}

impl StateChange {
    /// Builds an update event.
    #[must_use]
    pub fn updated(record: StateRecord) -> Self {
        Self {
            id: record.id.clone(),
            state: Some(record),
        }
    }

    /// Builds a deletion event.
    #[must_use]
    pub fn deleted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: None,
        }
    }
}
