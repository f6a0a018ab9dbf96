//! JSON codec for [`ChatMessage`] frames.
//!
//! Wire format: one UTF-8 JSON object per WebSocket text frame.
//!
//! ```text
//! {"username":"<string>","message":"<string>"}
//! ```
//!
//! Both fields are required.  Unknown extra fields are ignored so that newer
//! clients can attach metadata without breaking older relays.

use thiserror::Error;

use crate::protocol::messages::ChatMessage;

/// Errors that can occur while encoding or decoding a chat frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not a JSON object with string `username` and `message`.
    #[error("malformed chat frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The message could not be serialized.
    #[error("failed to encode chat frame: {0}")]
    Encode(#[source] serde_json::Error),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes a text frame into a [`ChatMessage`].
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if the text is not valid JSON or is
/// missing either field.
///
/// # Examples
///
/// ```rust
/// use relay_core::decode_chat_message;
///
/// let msg = decode_chat_message(r#"{"username":"A","message":"hi"}"#).unwrap();
/// assert_eq!(msg.username, "A");
/// assert_eq!(msg.message, "hi");
/// ```
pub fn decode_chat_message(text: &str) -> Result<ChatMessage, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Malformed)
}

/// Encodes a [`ChatMessage`] into the text of a single frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.  With two plain
/// string fields this does not happen in practice, but the error is
/// propagated rather than hidden.
pub fn encode_chat_message(msg: &ChatMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(ProtocolError::Encode)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_frame() {
        let msg = decode_chat_message(r#"{"username":"A","message":"/bot1 flight status"}"#)
            .unwrap();
        assert_eq!(msg, ChatMessage::new("A", "/bot1 flight status"));
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let msg =
            decode_chat_message(r#"{"username":"A","message":"x","color":"red"}"#).unwrap();
        assert_eq!(msg.message, "x");
    }

    #[test]
    fn test_decode_missing_message_field_is_malformed() {
        let result = decode_chat_message(r#"{"username":"A"}"#);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_non_json_is_malformed() {
        let result = decode_chat_message("hello");
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_wrong_field_type_is_malformed() {
        let result = decode_chat_message(r#"{"username":"A","message":42}"#);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_encode_uses_wire_field_names() {
        let text = encode_chat_message(&ChatMessage::from_bot("hello")).unwrap();
        assert_eq!(text, r#"{"username":"Bot","message":"hello"}"#);
    }

    #[test]
    fn test_encode_escapes_quotes() {
        let text = encode_chat_message(&ChatMessage::new("A", "say \"hi\"")).unwrap();
        let back = decode_chat_message(&text).unwrap();
        assert_eq!(back.message, "say \"hi\"");
    }
}
