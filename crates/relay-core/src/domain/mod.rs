//! Domain types for the chat relay.
//!
//! Everything in here is pure: no sockets, no clocks beyond what callers pass
//! in, no async.  The server crate wires these types into its registry,
//! router and WebSocket sessions.

/// Connection handles and bot session identifiers.
pub mod ids;

/// The immutable command-prefix → agent mapping.
pub mod agents;

/// Bot command grammar (`/bot1 ...` .. `/bot9 ...`).
pub mod command;

/// Extension point for rewriting user text before it is broadcast.
pub mod sanitize;
