//! WebSocket layer: admission, sessions, request routing, fan-out registry.
//!
//! The upgrade endpoint accepts clients at `/` and `/ws`. Every admitted
//! client first receives `hello`, then a snapshot or the structure
//! document, then live `state` pushes interleaved with request replies.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod registry;
pub mod router;
pub mod session;
