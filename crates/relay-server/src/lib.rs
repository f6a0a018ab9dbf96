//! relay-server library crate.
//!
//! A real-time chat relay: clients connect over WebSocket, every chat message
//! is fanned out to all connected clients, and messages starting with
//! `/bot1` .. `/bot9` are also forwarded to an NLU backend whose answers are
//! broadcast to the room.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Chat clients (JSON over WebSocket)
//!         ↕
//! [relay-server]
//!   ├── domain/           RelayConfig, IngressLimits, Timeouts
//!   ├── application/      ConnectionRegistry, IngressGuard, BroadcastHub,
//!   │                     BotRouter, NluClient + Recipient traits
//!   └── infrastructure/
//!         ├── ws_server/    Accept loop and admission (tokio-tungstenite)
//!         ├── session/      Per-connection read loop and keepalive
//!         ├── ws_recipient/ Recipient over a WebSocket write half
//!         ├── nlu_backends/ Disabled and echo backends
//!         └── config_file/  Optional TOML overrides
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `relay-core`; it never touches a
//!   socket, so it is tested entirely with in-memory doubles.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tungstenite`.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: registry, ingress limits, fan-out and bot routing.
pub mod application;

/// Infrastructure layer: WebSocket server, sessions and backends.
pub mod infrastructure;
