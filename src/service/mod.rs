//! Service layer: snapshots, change fan-out, and the structure document.
//!
//! [`SnapshotBuilder`] answers "what is the state right now",
//! [`BroadcastEngine`] pushes "what just changed", and [`StructureStore`]
//! serves the static layout description.

pub mod broadcast;
pub mod snapshot;
pub mod structure;

pub use broadcast::BroadcastEngine;
pub use snapshot::SnapshotBuilder;
pub use structure::StructureStore;
