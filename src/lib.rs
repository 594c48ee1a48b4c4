//! # state-bridge
//!
//! WebSocket bridge between a home-automation state store and any number
//! of live clients.
//!
//! Clients connect (optionally presenting a shared token), receive a
//! snapshot of the whitelisted states, then get every subsequent change
//! pushed to them. They can also read states on demand, register
//! subscriptions, and, when enabled, write states back.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)
//!     │
//!     ├── WS Handler / Session / RequestRouter (ws/)
//!     │
//!     ├── SnapshotBuilder, BroadcastEngine, StructureStore (service/)
//!     │
//!     ├── Whitelist, IdPattern, StateRecord (domain/)
//!     │
//!     └── StateGateway (external store; MemoryStateStore built in)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod server;
pub mod service;
pub mod ws;
