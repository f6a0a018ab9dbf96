//! Domain layer for relay-server.
//!
//! Only configuration lives here; the chat message, ids and agent mapping are
//! shared with other tools through `relay-core`.  Nothing in this module
//! performs I/O or reads the environment.

pub mod config;

pub use config::{IngressLimits, RelayConfig, Timeouts};
