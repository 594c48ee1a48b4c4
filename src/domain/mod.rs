//! Domain layer: state records, id patterns, and the state-store boundary.
//!
//! This module holds the types shared by every other layer: the records
//! forwarded to clients, the compiled whitelist patterns, the
//! [`StateGateway`] trait the bridge talks to, and an in-memory store that
//! implements it.

pub mod gateway;
pub mod memory_store;
pub mod pattern;
pub mod session_id;
pub mod state_record;
#[cfg(test)]
pub(crate) mod testing;

pub use gateway::{GatewayError, StateGateway};
pub use memory_store::MemoryStateStore;
pub use pattern::{IdPattern, PatternCache, PatternError, Whitelist};
pub use session_id::SessionId;
pub use state_record::{StateChange, StateRecord};
