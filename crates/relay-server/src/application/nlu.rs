//! NluClient trait: the seam between the bot router and the external
//! natural-language backend.
//!
//! The router only needs one operation: send a user's query to an agent within
//! a session and get back zero or more reply utterances.  Concrete backends
//! live in `infrastructure::nlu_backends`; tests use the mockall-generated
//! `MockNluClient`.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::{AgentId, SessionId};
use thiserror::Error;

/// Failures reported by an NLU backend.
///
/// Every variant results in the same apology message in the chat room.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("NLU transport error: {0}")]
    Transport(String),

    #[error("NLU authentication failed: {0}")]
    Authentication(String),

    /// The backend answered but produced no utterances.
    #[error("NLU backend returned no response")]
    EmptyResponse,

    #[error("NLU call timed out after {0:?}")]
    Timeout(Duration),

    /// No backend is configured for this relay.
    #[error("no NLU backend configured")]
    NotConfigured,
}

/// Intent-detection client.
///
/// Implementations must be safe to call from many connection tasks at once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NluClient: Send + Sync {
    /// Sends `text` to `agent` within `session` and returns the reply
    /// utterances in the order the backend produced them.
    async fn detect_intent(
        &self,
        session: &SessionId,
        text: &str,
        agent: &AgentId,
    ) -> Result<Vec<String>, BackendError>;
}
