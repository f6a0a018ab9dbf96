//! Infrastructure layer for the relay server.
//!
//! Everything that does I/O lives here:
//!
//! - Binding the TCP listener and running the accept loop (`ws_server`)
//! - The WebSocket upgrade handshake and admission responses (`ws_server`)
//! - Per-connection read loops and keepalive (`session`)
//! - Writing frames to a client's socket (`ws_recipient`)
//! - The bundled NLU backends (`nlu_backends`)
//! - Reading the optional TOML config file (`config_file`)
//!
//! # What does NOT belong here?
//!
//! - Admission limits, rate limiting and fan-out (application layer)
//! - Configuration defaults (domain layer)

pub mod config_file;
pub mod nlu_backends;
pub mod session;
pub mod ws_recipient;
pub mod ws_server;

pub use config_file::{load_config_file, ConfigError, FileConfig};
pub use nlu_backends::{DisabledNlu, EchoNlu};
pub use session::SessionError;
pub use ws_server::{run_server, serve, transport_config, RelayState};
