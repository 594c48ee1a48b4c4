//! Bridge error types with WebSocket close code mapping.
//!
//! [`BridgeError`] is the central error type for the bridge. Errors raised
//! during the handshake map to a close code sent to the client; everything
//! else is logged and recovered locally. Only [`BridgeError::Bind`] and
//! [`BridgeError::Config`] ever abort the process.

use std::net::SocketAddr;

use axum::extract::ws::close_code;

use crate::domain::{GatewayError, PatternError, SessionId};

/// Server-side error enum.
///
/// # Close Codes
///
/// | Variant    | Close code | Meaning            |
/// |------------|------------|--------------------|
/// | `Auth`     | 1008       | Policy violation   |
/// | `Protocol` | 1002       | Protocol error     |
/// | others     | 1011       | Internal error     |
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Missing or incorrect access token.
    #[error("invalid token")]
    Auth,

    /// The upgrade request or a client frame could not be understood.
    #[error("bad request: {0}")]
    Protocol(String),

    /// The state store failed.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A frame could not be queued for a session.
    #[error("delivery to session {0} failed")]
    Delivery(SessionId),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A whitelist pattern failed to compile.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Other I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns the WebSocket close code for this variant.
    #[must_use]
    pub const fn close_code(&self) -> u16 {
        match self {
            Self::Auth => close_code::POLICY,
            Self::Protocol(_) => close_code::PROTOCOL,
            Self::Gateway(_)
            | Self::Delivery(_)
            | Self::Config(_)
            | Self::Pattern(_)
            | Self::Bind { .. }
            | Self::Io(_) => close_code::ERROR,
        }
    }

    /// Returns the short reason sent with the close frame.
    #[must_use]
    pub const fn close_reason(&self) -> &'static str {
        match self {
            Self::Auth => "invalid token",
            Self::Protocol(_) => "bad request",
            _ => "internal error",
        }
    }
}
