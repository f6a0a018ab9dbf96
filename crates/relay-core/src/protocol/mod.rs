//! Protocol module containing the chat frame type and its JSON codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_chat_message, encode_chat_message, ProtocolError};
pub use messages::*;
