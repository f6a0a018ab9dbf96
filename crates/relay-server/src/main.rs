//! Chat relay server entry point.
//!
//! Accepts WebSocket connections, broadcasts every chat message to all
//! connected clients and forwards `/bot1` .. `/bot9` commands to an NLU
//! backend.
//!
//! # Usage
//!
//! ```text
//! relay-server [OPTIONS]
//!
//! Options:
//!   --bind <ADDR>            Listener IP address [default: 0.0.0.0]
//!   --port <PORT>            Listener port [default: 8080]
//!   --ws-path <PATH>         WebSocket upgrade path [default: /ws]
//!   --config <FILE>          Optional TOML file with limits, timeouts, agents
//!   --nlu-backend <KIND>     disabled | echo [default: disabled]
//!   --sanitize <POLICY>      none | html [default: none]
//!   --trust-forwarded-for    Count connections by X-Forwarded-For
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable               | Default    | Description                    |
//! |------------------------|------------|--------------------------------|
//! | `RELAY_BIND`           | `0.0.0.0`  | Listener IP address            |
//! | `PORT`                 | `8080`     | Listener port                  |
//! | `RELAY_WS_PATH`        | `/ws`      | WebSocket upgrade path         |
//! | `RELAY_CONFIG`         | (none)     | TOML config file               |
//! | `RELAY_NLU_BACKEND`    | `disabled` | NLU backend                    |
//! | `RELAY_SANITIZE`       | `none`     | Echo sanitization policy       |
//! | `RELAY_TRUST_FORWARDED_FOR` | `false` | Trust `X-Forwarded-For`     |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use relay_core::SanitizePolicy;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use relay_server::application::NluClient;
use relay_server::domain::RelayConfig;
use relay_server::infrastructure::{load_config_file, run_server, DisabledNlu, EchoNlu};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Which bundled NLU backend answers bot commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum NluBackendKind {
    /// Every bot command gets the apology reply.
    Disabled,
    /// Replies with the query, tagged with the agent id.
    Echo,
}

impl NluBackendKind {
    fn build(self) -> Arc<dyn NluClient> {
        match self {
            NluBackendKind::Disabled => Arc::new(DisabledNlu),
            NluBackendKind::Echo => Arc::new(EchoNlu),
        }
    }
}

/// Real-time WebSocket chat relay with NLU bot commands.
#[derive(Debug, Parser)]
#[command(name = "relay-server", about = "WebSocket chat relay with NLU bot commands", version)]
struct Cli {
    /// IP address to bind the listener to.
    #[arg(long, default_value = "0.0.0.0", env = "RELAY_BIND")]
    bind: String,

    /// TCP port to listen on.
    #[arg(long, default_value_t = 8080, env = "PORT")]
    port: u16,

    /// Request path that is upgraded to a WebSocket.
    #[arg(long, default_value = "/ws", env = "RELAY_WS_PATH")]
    ws_path: String,

    /// Optional TOML file with `[limits]`, `[timeouts]` and `[agents]`.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// NLU backend used for bot commands.
    #[arg(long, value_enum, default_value_t = NluBackendKind::Disabled, env = "RELAY_NLU_BACKEND")]
    nlu_backend: NluBackendKind,

    /// Sanitization applied to echoed message text (`none` or `html`).
    #[arg(long, default_value = "none", env = "RELAY_SANITIZE")]
    sanitize: SanitizePolicy,

    /// Use the first `X-Forwarded-For` entry as the client address.
    ///
    /// Only enable this behind a reverse proxy that sets the header.
    #[arg(long, env = "RELAY_TRUST_FORWARDED_FOR")]
    trust_forwarded_for: bool,
}

impl Cli {
    /// Converts the parsed arguments (and the config file, if any) into a
    /// [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not an IP address, if `--ws-path` does
    /// not start with `/`, or if the config file cannot be loaded.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let ip: IpAddr = self
            .bind
            .parse()
            .with_context(|| format!("invalid bind address: '{}'", self.bind))?;

        if !self.ws_path.starts_with('/') {
            anyhow::bail!("invalid WebSocket path '{}': must start with '/'", self.ws_path);
        }

        let mut config = RelayConfig {
            bind_addr: SocketAddr::new(ip, self.port),
            ws_path: self.ws_path,
            sanitize: self.sanitize,
            trust_forwarded_for: self.trust_forwarded_for,
            ..RelayConfig::default()
        };

        if let Some(path) = &self.config {
            let file = load_config_file(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?;
            config = file
                .apply(config)
                .with_context(|| format!("invalid config file {}", path.display()))?;
        }

        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let nlu = cli.nlu_backend.build();
    let backend = cli.nlu_backend;
    let config = cli.into_relay_config()?;

    info!(
        bind = %config.bind_addr,
        path = %config.ws_path,
        backend = ?backend,
        agents = config.agents.len(),
        "chat relay starting"
    );
    for (prefix, agent) in config.agents.iter() {
        debug!(%prefix, %agent, "bot agent bound");
    }

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, nlu, running).await?;

    info!("chat relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cli_defaults() {
        // Arrange: parse with no arguments (all defaults apply)
        let cli = Cli::parse_from(["relay-server"]);

        // Assert
        assert_eq!(cli.bind, "0.0.0.0");
        assert_eq!(cli.ws_path, "/ws");
        assert_eq!(cli.nlu_backend, NluBackendKind::Disabled);
        assert_eq!(cli.sanitize, SanitizePolicy::None);
        assert!(!cli.trust_forwarded_for);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "relay-server",
            "--port",
            "9000",
            "--nlu-backend",
            "echo",
            "--sanitize",
            "html",
            "--trust-forwarded-for",
        ]);
        assert_eq!(cli.port, 9000);
        assert_eq!(cli.nlu_backend, NluBackendKind::Echo);
        assert_eq!(cli.sanitize, SanitizePolicy::Html);
        assert!(cli.trust_forwarded_for);
    }

    #[test]
    fn test_cli_rejects_unknown_sanitize_policy() {
        let result = Cli::try_parse_from(["relay-server", "--sanitize", "markdown"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_into_relay_config_defaults() {
        // Arrange
        let cli = Cli::parse_from(["relay-server"]);

        // Act
        let config = cli.into_relay_config().unwrap();

        // Assert
        assert_eq!(config.bind_addr.ip().to_string(), "0.0.0.0");
        assert_eq!(config.limits.max_connections_per_address, 8);
        assert_eq!(config.timeouts.nlu, Duration::from_secs(10));
        assert_eq!(config.agents.len(), 9);
    }

    #[test]
    fn test_into_relay_config_custom_bind() {
        let cli = Cli::parse_from(["relay-server", "--bind", "127.0.0.1", "--port", "9100"]);
        let config = cli.into_relay_config().unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9100");
    }

    #[test]
    fn test_into_relay_config_invalid_bind_returns_error() {
        // Arrange: build the struct directly to bypass env defaults
        let cli = Cli {
            bind: "not.an.ip".to_string(),
            port: 8080,
            ws_path: "/ws".to_string(),
            config: None,
            nlu_backend: NluBackendKind::Disabled,
            sanitize: SanitizePolicy::None,
            trust_forwarded_for: false,
        };

        // Act
        let result = cli.into_relay_config();

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }

    #[test]
    fn test_into_relay_config_rejects_relative_ws_path() {
        let cli = Cli::parse_from(["relay-server", "--ws-path", "chat"]);
        assert!(cli.into_relay_config().is_err());
    }

    #[test]
    fn test_into_relay_config_missing_config_file_returns_error() {
        let cli = Cli::parse_from([
            "relay-server",
            "--config",
            "/nonexistent/path/that/cannot/exist/relay.toml",
        ]);
        assert!(cli.into_relay_config().is_err());
    }
}
