//! Command prefix → NLU agent mapping.
//!
//! The relay understands exactly nine command prefixes, `/bot1` to `/bot9`.
//! Each may be bound to an opaque agent identifier understood by the NLU
//! backend.  The mapping is built once at startup (defaults, optionally
//! overridden from the config file) and never changes afterwards, so it is
//! shared across sessions behind an `Arc` without any locking.

use std::fmt;

use thiserror::Error;
use tracing::debug;

/// The literal part every command prefix starts with.
pub const COMMAND_KEYWORD: &str = "/bot";

/// Number of addressable agents (`/bot1` .. `/bot9`).
pub const AGENT_SLOTS: usize = 9;

/// Agents of the reference deployment, indexed by digit − 1.
const DEFAULT_AGENTS: [(&str, &str); AGENT_SLOTS] = [
    ("/bot1", "9a9d4f03-3ca9-4517-b653-ff0843045cee"), // Travel - flight information
    ("/bot2", "df680c7d-6fc9-4e3c-a28f-bd2ca88e03ba"), // Small talk
    ("/bot3", "4fb51b11-e84a-47bc-99f9-d36cbf2a913b"), // Telecommunications
    ("/bot4", "acd70926-641c-4984-917a-b8062243a38d"), // Financial services
    ("/bot5", "cb9714ef-eac1-44ea-96d3-18befcfcaed8"), // Payment arrangement
    ("/bot6", "14abc25d-229e-4119-b596-534dac48607b"), // Order and account management
    ("/bot7", "84bbfb0f-624e-4e72-802b-3469cfaefa9f"), // Healthcare
    ("/bot8", "d1aa5bec-e6ea-4778-917a-cd366c571bcc"), // Baggage claim
    ("/bot9", "1e0d311c-73b5-4770-828d-83a6d3a4a9df"), // Car rental
];

/// Error type for building an [`AgentMapping`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentMappingError {
    /// The key is not of the form `/bot<1-9>`.
    #[error("invalid command prefix {0:?}: expected /bot1 .. /bot9")]
    InvalidPrefix(String),

    /// The agent identifier is empty or whitespace.
    #[error("empty agent id for command prefix {0}")]
    EmptyAgentId(String),
}

/// Opaque agent identifier passed verbatim to the NLU backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable mapping from command prefix to agent.
///
/// Backed by a fixed array indexed by the prefix digit, so lookups never
/// allocate or hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentMapping {
    slots: [Option<AgentId>; AGENT_SLOTS],
}

impl AgentMapping {
    /// Creates a mapping with no agents bound.  Every command then resolves
    /// to the usage error.
    pub fn empty() -> Self {
        Self {
            slots: Default::default(),
        }
    }

    /// Returns a copy of `self` with the given `(prefix, agent_id)` pairs
    /// bound, replacing any existing binding for the same prefix.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMappingError`] if a prefix is not `/bot1` .. `/bot9` or
    /// an agent id is blank.  No partial mapping is returned on error.
    pub fn with_overrides<I, K, V>(mut self, entries: I) -> Result<Self, AgentMappingError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (prefix, agent) in entries {
            let prefix = prefix.as_ref();
            let agent = agent.as_ref().trim();
            let slot = slot_for_prefix(prefix)
                .ok_or_else(|| AgentMappingError::InvalidPrefix(prefix.to_string()))?;
            if agent.is_empty() {
                return Err(AgentMappingError::EmptyAgentId(prefix.to_string()));
            }
            if self.slots[slot].is_some() {
                debug!(prefix, "overriding agent mapping entry");
            }
            self.slots[slot] = Some(AgentId::new(agent));
        }
        Ok(self)
    }

    /// Looks up the agent bound to a full prefix such as `"/bot3"`.
    ///
    /// Returns `None` for anything that is not a bound `/bot<1-9>` prefix.
    pub fn get(&self, prefix: &str) -> Option<&AgentId> {
        slot_for_prefix(prefix).and_then(|slot| self.slots[slot].as_ref())
    }

    /// Number of bound prefixes.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over bound `(prefix, agent)` pairs in prefix order.
    pub fn iter(&self) -> impl Iterator<Item = (String, &AgentId)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref()
                .map(|agent| (format!("{COMMAND_KEYWORD}{}", i + 1), agent))
        })
    }
}

impl Default for AgentMapping {
    /// The nine agents of the reference deployment.
    fn default() -> Self {
        let mut slots: [Option<AgentId>; AGENT_SLOTS] = Default::default();
        for (i, (_, agent)) in DEFAULT_AGENTS.iter().enumerate() {
            slots[i] = Some(AgentId::new(*agent));
        }
        Self { slots }
    }
}

/// Maps `/bot1` .. `/bot9` to array index 0 .. 8.
fn slot_for_prefix(prefix: &str) -> Option<usize> {
    let digit = prefix.strip_prefix(COMMAND_KEYWORD)?;
    match digit.as_bytes() {
        [d @ b'1'..=b'9'] => Some(usize::from(d - b'1')),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
