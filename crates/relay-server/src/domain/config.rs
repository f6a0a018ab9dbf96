//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It is assembled in `main.rs` from CLI arguments and the optional TOML
//! config file, or taken from [`Default`] in tests.
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads in here) lets the server be embedded in integration tests
//! with any limits the test needs.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use relay_core::{AgentMapping, SanitizePolicy};

/// Ingress limits enforced by the guard and the WebSocket transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressLimits {
    /// Maximum concurrent connections from one source address.
    pub max_connections_per_address: usize,

    /// Minimum time between two accepted messages on one connection.
    pub min_message_interval: Duration,

    /// Largest WebSocket frame (and reassembled message) in bytes.
    ///
    /// Enforced by tungstenite while reading; an oversize frame closes the
    /// connection before the JSON is parsed.
    pub max_frame_bytes: usize,

    /// Largest accepted message text, in characters.
    pub max_message_chars: usize,
}

impl Default for IngressLimits {
    /// | Field                        | Default  |
    /// |------------------------------|----------|
    /// | max_connections_per_address  | 8        |
    /// | min_message_interval         | 100 ms   |
    /// | max_frame_bytes              | 1024     |
    /// | max_message_chars            | 500      |
    fn default() -> Self {
        Self {
            max_connections_per_address: 8,
            min_message_interval: Duration::from_millis(100),
            max_frame_bytes: 1024,
            max_message_chars: 500,
        }
    }
}

/// Time bounds for connections and the NLU backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// A connection with no inbound frame for this long is closed.
    pub idle: Duration,

    /// How often the server pings each client.  Each Pong resets the idle
    /// deadline, so a healthy but silent client stays connected.
    pub ping_interval: Duration,

    /// Upper bound on a single write to one client.  A recipient that cannot
    /// accept a frame within this time is treated as broken.
    pub write: Duration,

    /// Upper bound on one NLU backend call.
    pub nlu: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(5 * 60),
            ping_interval: Duration::from_secs(30),
            write: Duration::from_secs(5),
            nlu: Duration::from_secs(10),
        }
    }
}

/// All runtime configuration for the relay.
///
/// Build this once at startup and share it behind an `Arc`.
///
/// # Example
///
/// ```rust
/// use relay_server::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8080);
/// assert_eq!(cfg.ws_path, "/ws");
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: SocketAddr,

    /// Request path that is upgraded to a WebSocket; other paths get 404.
    pub ws_path: String,

    pub limits: IngressLimits,
    pub timeouts: Timeouts,

    /// Command prefix → agent mapping, fixed for the process lifetime.
    pub agents: AgentMapping,

    /// Policy applied to user text before it is echoed to the room.
    pub sanitize: SanitizePolicy,

    /// Use the first `X-Forwarded-For` entry as the client address.
    ///
    /// Only enable this behind a reverse proxy that sets the header; a
    /// directly exposed relay would otherwise let clients pick their own
    /// address and dodge the per-address cap.
    pub trust_forwarded_for: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            ws_path: "/ws".to_string(),
            limits: IngressLimits::default(),
            timeouts: Timeouts::default(),
            agents: AgentMapping::default(),
            sanitize: SanitizePolicy::default(),
            trust_forwarded_for: false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
