//! Identifiers attached to every admitted connection.
//!
//! A connection carries two independent identifiers:
//!
//! - [`ConnectionId`] is the registry key.  It is never shown to clients.
//! - [`SessionId`] is sent to the NLU backend with every bot command so the
//!   backend can keep conversational context across several commands from the
//!   same connection.
//!
//! Both are random v4 UUIDs, so they are unique with overwhelming probability
//! across every connection the process ever sees.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque handle identifying one live connection in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh random handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversational session identifier shared with the NLU backend.
///
/// Rendered as `session-<32 hex digits>`.  Generated once at admission and
/// reused for every bot invocation on that connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh session identifier.
    pub fn generate() -> Self {
        Self(format!("session-{}", Uuid::new_v4().simple()))
    }

    /// Wraps an existing identifier, e.g. one restored by a test or a
    /// backend that issues its own session tokens.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
