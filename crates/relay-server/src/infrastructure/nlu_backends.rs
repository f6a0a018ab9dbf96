//! Bundled [`NluClient`] implementations.
//!
//! Real providers are plugged in by implementing the trait; the relay ships
//! two backends that need no credentials.

use async_trait::async_trait;
use relay_core::{AgentId, SessionId};
use tracing::debug;

use crate::application::{BackendError, NluClient};

/// Backend used when no provider is configured.  Every call fails, so each
/// bot command produces the apology message.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNlu;

#[async_trait]
impl NluClient for DisabledNlu {
    async fn detect_intent(
        &self,
        _session: &SessionId,
        _text: &str,
        _agent: &AgentId,
    ) -> Result<Vec<String>, BackendError> {
        Err(BackendError::NotConfigured)
    }
}

/// Development backend that answers with the query, tagged with the agent.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoNlu;

#[async_trait]
impl NluClient for EchoNlu {
    async fn detect_intent(
        &self,
        session: &SessionId,
        text: &str,
        agent: &AgentId,
    ) -> Result<Vec<String>, BackendError> {
        debug!(%session, %agent, "echo backend answering");
        Ok(vec![format!("[{agent}] {text}")])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_backend_reports_not_configured() {
        let result = DisabledNlu
            .detect_intent(&SessionId::generate(), "hi", &AgentId::new("a"))
            .await;
        assert_eq!(result, Err(BackendError::NotConfigured));
    }

    #[tokio::test]
    async fn test_echo_backend_tags_reply_with_agent() {
        let result = EchoNlu
            .detect_intent(&SessionId::generate(), "flight status", &AgentId::new("travel"))
            .await;
        assert_eq!(result, Ok(vec!["[travel] flight status".to_string()]));
    }
}
