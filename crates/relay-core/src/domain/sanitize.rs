//! Message sanitization hook.
//!
//! User text passes through a [`Sanitizer`] before it is echoed to the room.
//! The relay itself does not decide how text should be cleaned; the policy is
//! picked at startup from configuration.  Two policies ship with the crate:
//!
//! | Policy        | Behaviour                                   |
//! |---------------|---------------------------------------------|
//! | `none`        | Text is forwarded unchanged (default).      |
//! | `html`        | `& < > " '` are replaced by HTML entities.  |

use std::borrow::Cow;
use std::str::FromStr;

/// Rewrites user-supplied text before it is broadcast.
pub trait Sanitizer: Send + Sync {
    /// Returns the sanitized form of `input`, borrowing when nothing changes.
    fn sanitize<'a>(&self, input: &'a str) -> Cow<'a, str>;
}

/// Forwards text unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Sanitizer for Passthrough {
    fn sanitize<'a>(&self, input: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(input)
    }
}

/// Escapes the five HTML-significant characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlEscape;

impl Sanitizer for HtmlEscape {
    fn sanitize<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains(&['&', '<', '>', '"', '\''][..]) {
            return Cow::Borrowed(input);
        }
        let mut out = String::with_capacity(input.len() + 16);
        for c in input.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\'' => out.push_str("&#39;"),
                other => out.push(other),
            }
        }
        Cow::Owned(out)
    }
}

/// Selectable sanitization policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SanitizePolicy {
    #[default]
    None,
    Html,
}

impl SanitizePolicy {
    /// Builds the sanitizer implementing this policy.
    pub fn build(self) -> Box<dyn Sanitizer> {
        match self {
            SanitizePolicy::None => Box::new(Passthrough),
            SanitizePolicy::Html => Box::new(HtmlEscape),
        }
    }
}

impl FromStr for SanitizePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(SanitizePolicy::None),
            "html" => Ok(SanitizePolicy::Html),
            other => Err(format!("unknown sanitize policy {other:?} (expected none or html)")),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
