//! Type-safe session identifier.
//!
//! [`SessionId`] wraps a [`uuid::Uuid`] (v4) so session keys cannot be
//! confused with state ids or other strings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a connected client session.
///
/// Generated once when the WebSocket handshake is accepted and used as the
/// key in the live-session registry and in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Creates a new random `SessionId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn display_is_uuid() {
        let id = SessionId::new();
        assert_eq!(id.to_string(), id.as_uuid().to_string());
    }
}
