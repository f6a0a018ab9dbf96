//! Optional TOML configuration file.
//!
//! The CLI covers the listener and the pluggable parts (NLU backend,
//! sanitizer).  Limits, timeouts and the agent table live in a file so that
//! a deployment can tune them without a long command line:
//!
//! ```toml
//! [limits]
//! max_connections_per_address = 8
//! min_message_interval_ms = 100
//! max_frame_bytes = 1024
//! max_message_chars = 500
//!
//! [timeouts]
//! idle_secs = 300
//! ping_interval_secs = 30
//! write_secs = 5
//! nlu_secs = 10
//!
//! [agents]
//! "/bot1" = "9a9d4f03-3ca9-4517-b653-ff0843045cee"
//! ```
//!
//! Every field has a default, so an empty file is valid.  Entries under
//! `[agents]` replace the built-in binding for that prefix; prefixes that are
//! not listed keep their default agent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_core::AgentMappingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{IngressLimits, RelayConfig, Timeouts};

/// Error type for loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid [agents] entry: {0}")]
    InvalidAgent(#[from] AgentMappingError),

    /// A limit that must be positive was set to zero.
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    #[error("{name} must be at most {max} seconds")]
    TimerTooLong { name: &'static str, max: u64 },
}

/// Upper bound for every `[timeouts]` entry (one day).
pub const MAX_TIMER_SECS: u64 = 24 * 60 * 60;

// ── Schema ────────────────────────────────────────────────────────────────────

/// Top-level layout of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
    /// Command prefix → agent id overrides.
    #[serde(default)]
    pub agents: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LimitsSection {
    #[serde(default = "default_max_connections")]
    pub max_connections_per_address: usize,
    #[serde(default = "default_min_interval_ms")]
    pub min_message_interval_ms: u64,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsSection {
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_write_secs")]
    pub write_secs: u64,
    #[serde(default = "default_nlu_secs")]
    pub nlu_secs: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_max_connections() -> usize {
    IngressLimits::default().max_connections_per_address
}
fn default_min_interval_ms() -> u64 {
    millis(IngressLimits::default().min_message_interval)
}
fn default_max_frame_bytes() -> usize {
    IngressLimits::default().max_frame_bytes
}
fn default_max_message_chars() -> usize {
    IngressLimits::default().max_message_chars
}
fn default_idle_secs() -> u64 {
    Timeouts::default().idle.as_secs()
}
fn default_ping_interval_secs() -> u64 {
    Timeouts::default().ping_interval.as_secs()
}
fn default_write_secs() -> u64 {
    Timeouts::default().write.as_secs()
}
fn default_nlu_secs() -> u64 {
    Timeouts::default().nlu.as_secs()
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_connections_per_address: default_max_connections(),
            min_message_interval_ms: default_min_interval_ms(),
            max_frame_bytes: default_max_frame_bytes(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            idle_secs: default_idle_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            write_secs: default_write_secs(),
            nlu_secs: default_nlu_secs(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl FileConfig {
    /// Folds the file's settings into `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAgent`] for a bad `[agents]` entry and
    /// [`ConfigError::ZeroLimit`] when a limit or timer that must be positive
    /// is zero.  `min_message_interval_ms = 0` is allowed and disables the
    /// rate limit.  Timers above [`MAX_TIMER_SECS`] are rejected with
    /// [`ConfigError::TimerTooLong`].
    pub fn apply(self, mut config: RelayConfig) -> Result<RelayConfig, ConfigError> {
        let l = self.limits;
        let t = self.timeouts;
        for (name, value) in [
            ("limits.max_connections_per_address", l.max_connections_per_address as u64),
            ("limits.max_frame_bytes", l.max_frame_bytes as u64),
            ("limits.max_message_chars", l.max_message_chars as u64),
            ("timeouts.idle_secs", t.idle_secs),
            ("timeouts.ping_interval_secs", t.ping_interval_secs),
            ("timeouts.write_secs", t.write_secs),
            ("timeouts.nlu_secs", t.nlu_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroLimit(name));
            }
        }
        for (name, value) in [
            ("timeouts.idle_secs", t.idle_secs),
            ("timeouts.ping_interval_secs", t.ping_interval_secs),
            ("timeouts.write_secs", t.write_secs),
            ("timeouts.nlu_secs", t.nlu_secs),
        ] {
            if value > MAX_TIMER_SECS {
                return Err(ConfigError::TimerTooLong {
                    name,
                    max: MAX_TIMER_SECS,
                });
            }
        }

        config.limits = IngressLimits {
            max_connections_per_address: l.max_connections_per_address,
            min_message_interval: Duration::from_millis(l.min_message_interval_ms),
            max_frame_bytes: l.max_frame_bytes,
            max_message_chars: l.max_message_chars,
        };
        config.timeouts = Timeouts {
            idle: Duration::from_secs(t.idle_secs),
            ping_interval: Duration::from_secs(t.ping_interval_secs),
            write: Duration::from_secs(t.write_secs),
            nlu: Duration::from_secs(t.nlu_secs),
        };
        config.agents = config.agents.with_overrides(&self.agents)?;
        Ok(config)
    }
}

/// Parses config file content.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed or has unknown keys.
pub fn parse_config(content: &str) -> Result<FileConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Reads and parses the config file at `path`.
///
/// Unlike the listener settings, an explicitly named file that does not
/// exist is an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if it is not valid.
pub fn load_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
