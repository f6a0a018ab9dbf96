//! The chat frame exchanged between clients and the relay.
//!
//! Every WebSocket text frame in either direction carries exactly one JSON
//! object with two string fields:
//!
//! ```json
//! {"username":"alice","message":"hello room"}
//! ```
//!
//! The relay never invents a second schema.  Warnings to a single sender,
//! bot replies and ordinary chat all use this shape; they differ only in the
//! `username`, which is one of the reserved identities below for anything
//! the relay produces itself.

use serde::{Deserialize, Serialize};

/// Identity used for every message produced by the bot command router.
pub const BOT_USERNAME: &str = "Bot";

/// Identity used for advisory replies sent only to the offending sender
/// (rate limit and length warnings).
pub const SERVER_USERNAME: &str = "Server";

/// Reply broadcast when a `/bot` prefix has no agent mapped to it.
pub const UNKNOWN_COMMAND_TEXT: &str = "Invalid bot command. Use /bot1 to /bot9.";

/// Reply broadcast when the NLU backend fails or returns nothing.
pub const BACKEND_APOLOGY_TEXT: &str = "Sorry, I couldn't process your request.";

/// Warning sent to a sender that exceeded the per-connection message rate.
pub const RATE_LIMIT_WARNING_TEXT: &str =
    "You are sending messages too quickly. Please slow down.";

/// A single chat message.
///
/// This is a plain value type: two messages with the same fields are the same
/// message.  The JSON field for the text is called `message` on the wire; the
/// Rust field keeps the same name so the mapping stays obvious.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Self-declared display name.  Not verified by the relay.
    pub username: String,
    /// Message body.
    pub message: String,
}

impl ChatMessage {
    /// Creates a message from any pair of string-like values.
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
        }
    }

    /// Creates a message attributed to the [`BOT_USERNAME`] identity.
    pub fn from_bot(message: impl Into<String>) -> Self {
        Self::new(BOT_USERNAME, message)
    }

    /// Creates an advisory message attributed to the [`SERVER_USERNAME`] identity.
    pub fn from_server(message: impl Into<String>) -> Self {
        Self::new(SERVER_USERNAME, message)
    }

    /// Number of Unicode scalar values in the message body.
    ///
    /// The character limit is expressed in characters, not bytes, so a
    /// 500-character message in a non-Latin script is still accepted.
    pub fn char_count(&self) -> usize {
        self.message.chars().count()
    }
}

/// Builds the warning text for a message longer than `limit` characters.
pub fn too_long_warning(limit: usize) -> String {
    format!("Message is too long. Limit to {limit} characters.")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
