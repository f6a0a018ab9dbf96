//! Bot command grammar.
//!
//! ```text
//! command  = "/bot" digit [separator] query
//! digit    = "1" .. "9"
//! query    = any text (may be empty)
//! ```
//!
//! Any text that starts with `/bot` is *command-shaped*.  The prefix is
//! `/bot` plus the next character; if that prefix is not bound in the
//! [`AgentMapping`] the result is [`BotCommand::Unknown`].  This covers
//! `/bot` on its own, `/bot0`, `/botX` and `/botanist`.  Parsing works on
//! character boundaries, so a multi-byte character after `/bot` is handled
//! like any other unknown prefix instead of splitting a code point.

use crate::domain::agents::{AgentId, AgentMapping, COMMAND_KEYWORD};

/// Result of classifying one message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand<'a> {
    /// Ordinary chat; the router does nothing.
    NotACommand,

    /// Starts with `/bot` but the prefix has no agent bound.
    Unknown {
        /// The offending prefix, e.g. `"/botX"` or `"/bot"`.
        prefix: &'a str,
    },

    /// A bound command ready to be sent to the backend.
    Invoke {
        /// The matched prefix, e.g. `"/bot1"`.
        prefix: &'a str,
        /// Agent bound to the prefix.
        agent: AgentId,
        /// Text after the prefix with leading whitespace removed.
        query: &'a str,
    },
}

/// Classifies `text` against `mapping`.
///
/// # Examples
///
/// ```rust
/// use relay_core::{parse_command, AgentMapping, BotCommand};
///
/// let mapping = AgentMapping::default();
/// match parse_command("/bot1 flight status", &mapping) {
///     BotCommand::Invoke { prefix, query, .. } => {
///         assert_eq!(prefix, "/bot1");
///         assert_eq!(query, "flight status");
///     }
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
pub fn parse_command<'a>(text: &'a str, mapping: &AgentMapping) -> BotCommand<'a> {
    let Some(rest) = text.strip_prefix(COMMAND_KEYWORD) else {
        return BotCommand::NotACommand;
    };

    // Width of the character that follows the keyword (0 if there is none).
    let selector_len = rest.chars().next().map_or(0, char::len_utf8);
    let prefix_len = COMMAND_KEYWORD.len() + selector_len;
    let prefix = &text[..prefix_len];

    match mapping.get(prefix) {
        Some(agent) => BotCommand::Invoke {
            prefix,
            agent: agent.clone(),
            query: text[prefix_len..].trim_start(),
        },
        None => BotCommand::Unknown { prefix },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
