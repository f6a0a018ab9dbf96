//! # relay-core
//!
//! Shared library for the chat relay containing the client-facing wire
//! protocol, the identifiers that tie a connection to its bot session, the
//! bot command grammar and the message sanitization hook.
//!
//! It has zero dependencies on sockets, async runtimes or the NLU backend.
//!
//! # Architecture overview
//!
//! The relay accepts WebSocket connections, fans every chat message out to
//! all connected clients and forwards `/botN` commands to an external
//! natural-language-understanding backend.  This crate is the pure
//! foundation that the server builds on:
//!
//! - **`protocol`** – The JSON `{"username", "message"}` frame exchanged with
//!   clients, the reserved identities (`Bot`, `Server`) and the literal
//!   replies the relay produces.
//!
//! - **`domain`** – Connection and session identifiers, the immutable
//!   command-prefix → agent mapping, the command parser and the
//!   [`Sanitizer`] extension point.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `relay_core::ChatMessage` instead of `relay_core::protocol::messages::ChatMessage`.
pub use domain::agents::{AgentId, AgentMapping, AgentMappingError};
pub use domain::command::{parse_command, BotCommand};
pub use domain::ids::{ConnectionId, SessionId};
pub use domain::sanitize::{HtmlEscape, Passthrough, SanitizePolicy, Sanitizer};
pub use protocol::codec::{decode_chat_message, encode_chat_message, ProtocolError};
pub use protocol::messages::ChatMessage;
