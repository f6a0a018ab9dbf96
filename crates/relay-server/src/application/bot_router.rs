//! BotRouter: turns `/botN` chat messages into NLU calls and broadcasts the
//! answers.
//!
//! Every outcome that produces text puts it on the hub under the `Bot`
//! identity, so the whole room sees the question (echoed by the session) and
//! the answer in the same order.
//!
//! | Input                       | Backend call | Broadcast                           |
//! |-----------------------------|--------------|-------------------------------------|
//! | ordinary chat               | no           | nothing                             |
//! | unbound `/bot…` prefix      | no           | usage message                       |
//! | bound prefix, k utterances  | yes          | k messages, in backend order        |
//! | bound prefix, failure/empty | yes          | one apology                         |

use std::sync::Arc;
use std::time::Duration;

use relay_core::protocol::messages::{BACKEND_APOLOGY_TEXT, UNKNOWN_COMMAND_TEXT};
use relay_core::{parse_command, AgentMapping, BotCommand, ChatMessage, SessionId};
use tracing::{debug, info, warn};

use super::hub::HubHandle;
use super::nlu::{BackendError, NluClient};

/// What the router did with a message.  Returned mainly for tests and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    NotACommand,
    UnknownCommand,
    Answered { utterances: usize },
    BackendFailed(BackendError),
}

pub struct BotRouter {
    agents: Arc<AgentMapping>,
    nlu: Arc<dyn NluClient>,
    hub: HubHandle,
    call_timeout: Duration,
}

impl BotRouter {
    pub fn new(
        agents: Arc<AgentMapping>,
        nlu: Arc<dyn NluClient>,
        hub: HubHandle,
        call_timeout: Duration,
    ) -> Self {
        Self {
            agents,
            nlu,
            hub,
            call_timeout,
        }
    }

    /// Routes one chat text sent by the connection owning `session`.
    ///
    /// The call to the backend happens on the caller's task, so a slow
    /// backend delays only that connection's next read.
    pub async fn dispatch(&self, session: &SessionId, text: &str) -> RouteOutcome {
        let (prefix, agent, query) = match parse_command(text, &self.agents) {
            BotCommand::NotACommand => return RouteOutcome::NotACommand,
            BotCommand::Unknown { prefix } => {
                debug!(prefix, "unknown bot command");
                self.broadcast(UNKNOWN_COMMAND_TEXT);
                return RouteOutcome::UnknownCommand;
            }
            BotCommand::Invoke {
                prefix,
                agent,
                query,
            } => (prefix, agent, query),
        };

        info!(%session, prefix, %agent, "forwarding bot command");
        match self.call_backend(session, query, &agent).await {
            Ok(utterances) => {
                let count = utterances.len();
                for text in utterances {
                    self.broadcast(text);
                }
                RouteOutcome::Answered { utterances: count }
            }
            Err(e) => {
                warn!(%session, prefix, error = %e, "NLU backend call failed");
                self.broadcast(BACKEND_APOLOGY_TEXT);
                RouteOutcome::BackendFailed(e)
            }
        }
    }

    async fn call_backend(
        &self,
        session: &SessionId,
        query: &str,
        agent: &relay_core::AgentId,
    ) -> Result<Vec<String>, BackendError> {
        let utterances = tokio::time::timeout(
            self.call_timeout,
            self.nlu.detect_intent(session, query, agent),
        )
        .await
        .map_err(|_| BackendError::Timeout(self.call_timeout))??;

        if utterances.is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        Ok(utterances)
    }

    fn broadcast(&self, text: impl Into<String>) {
        if let Err(e) = self.hub.enqueue(ChatMessage::from_bot(text)) {
            warn!(error = %e, "bot reply dropped");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::hub::BroadcastHub;
    use crate::application::nlu::MockNluClient;
    use crate::application::recording::RecordingRecipient;
    use crate::application::registry::ConnectionRegistry;
    use async_trait::async_trait;
    use relay_core::{AgentId, ConnectionId};

    const FLIGHT_AGENT: &str = "9a9d4f03-3ca9-4517-b653-ff0843045cee";

    /// Router wired to a real hub with one recording recipient.
    struct Fixture {
        router: BotRouter,
        hub: BroadcastHub,
        room: Arc<RecordingRecipient>,
    }

    impl Fixture {
        fn new(nlu: impl NluClient + 'static) -> Self {
            let registry = Arc::new(ConnectionRegistry::new());
            let room = RecordingRecipient::new();
            registry
                .register(
                    ConnectionId::new(),
                    "127.0.0.1".parse().unwrap(),
                    SessionId::generate(),
                    room.clone(),
                )
                .unwrap();
            let (hub, handle) = BroadcastHub::new(registry, Duration::from_secs(5));
            let router = BotRouter::new(
                Arc::new(AgentMapping::default()),
                Arc::new(nlu),
                handle,
                Duration::from_secs(10),
            );
            Self { router, hub, room }
        }

        /// Drops the router so the hub drains, then returns what the room saw.
        async fn broadcasts(self) -> Vec<ChatMessage> {
            drop(self.router);
            self.hub.run().await;
            self.room.messages()
        }
    }

    fn unused_backend() -> MockNluClient {
        let mut nlu = MockNluClient::new();
        nlu.expect_detect_intent().times(0);
        nlu
    }

    #[tokio::test]
    async fn test_plain_chat_is_ignored() {
        let fx = Fixture::new(unused_backend());
        let outcome = fx.router.dispatch(&SessionId::generate(), "hello room").await;
        assert_eq!(outcome, RouteOutcome::NotACommand);
        assert!(fx.broadcasts().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_prefixes_broadcast_usage_without_backend_call() {
        for text in ["/bot0 hi", "/botX hi", "/bot", "/botanist"] {
            let fx = Fixture::new(unused_backend());
            let outcome = fx.router.dispatch(&SessionId::generate(), text).await;
            assert_eq!(outcome, RouteOutcome::UnknownCommand, "input {text:?}");
            assert_eq!(
                fx.broadcasts().await,
                vec![ChatMessage::from_bot(UNKNOWN_COMMAND_TEXT)]
            );
        }
    }

    #[tokio::test]
    async fn test_bound_command_forwards_query_session_and_agent() {
        let session = SessionId::from_string("session-42");
        let mut nlu = MockNluClient::new();
        nlu.expect_detect_intent()
            .withf(|s, text, agent| {
                s.as_str() == "session-42"
                    && text == "flight status"
                    && *agent == AgentId::new(FLIGHT_AGENT)
            })
            .times(1)
            .returning(|_, _, _| Ok(vec!["Your flight is on time.".to_string()]));
        let fx = Fixture::new(nlu);

        let outcome = fx.router.dispatch(&session, "/bot1 flight status").await;

        assert_eq!(outcome, RouteOutcome::Answered { utterances: 1 });
        assert_eq!(
            fx.broadcasts().await,
            vec![ChatMessage::from_bot("Your flight is on time.")]
        );
    }

    #[tokio::test]
    async fn test_multiple_utterances_are_broadcast_in_backend_order() {
        let mut nlu = MockNluClient::new();
        nlu.expect_detect_intent().returning(|_, _, _| {
            Ok(vec!["one".to_string(), "two".to_string(), "three".to_string()])
        });
        let fx = Fixture::new(nlu);

        let outcome = fx.router.dispatch(&SessionId::generate(), "/bot2 hi").await;

        assert_eq!(outcome, RouteOutcome::Answered { utterances: 3 });
        let texts: Vec<String> = fx.broadcasts().await.into_iter().map(|m| m.message).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_backend_error_broadcasts_single_apology() {
        let mut nlu = MockNluClient::new();
        nlu.expect_detect_intent()
            .returning(|_, _, _| Err(BackendError::Transport("connection refused".into())));
        let fx = Fixture::new(nlu);

        let outcome = fx.router.dispatch(&SessionId::generate(), "/bot3 bill").await;

        assert!(matches!(outcome, RouteOutcome::BackendFailed(BackendError::Transport(_))));
        assert_eq!(
            fx.broadcasts().await,
            vec![ChatMessage::from_bot(BACKEND_APOLOGY_TEXT)]
        );
    }

    #[tokio::test]
    async fn test_empty_backend_response_is_treated_as_failure() {
        let mut nlu = MockNluClient::new();
        nlu.expect_detect_intent().returning(|_, _, _| Ok(Vec::new()));
        let fx = Fixture::new(nlu);

        let outcome = fx.router.dispatch(&SessionId::generate(), "/bot4 balance").await;

        assert_eq!(outcome, RouteOutcome::BackendFailed(BackendError::EmptyResponse));
        assert_eq!(
            fx.broadcasts().await,
            vec![ChatMessage::from_bot(BACKEND_APOLOGY_TEXT)]
        );
    }

    #[tokio::test]
    async fn test_command_without_query_sends_empty_text() {
        let mut nlu = MockNluClient::new();
        nlu.expect_detect_intent()
            .withf(|_, text, _| text.is_empty())
            .returning(|_, _, _| Ok(vec!["How can I help?".to_string()]));
        let fx = Fixture::new(nlu);

        let outcome = fx.router.dispatch(&SessionId::generate(), "/bot5").await;

        assert_eq!(outcome, RouteOutcome::Answered { utterances: 1 });
    }

    struct Unresponsive;

    #[async_trait]
    impl NluClient for Unresponsive {
        async fn detect_intent(
            &self,
            _session: &SessionId,
            _text: &str,
            _agent: &AgentId,
        ) -> Result<Vec<String>, BackendError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_timeout_broadcasts_single_apology() {
        let fx = Fixture::new(Unresponsive);

        let outcome = fx.router.dispatch(&SessionId::generate(), "/bot7 symptoms").await;

        assert_eq!(
            outcome,
            RouteOutcome::BackendFailed(BackendError::Timeout(Duration::from_secs(10)))
        );
        assert_eq!(
            fx.broadcasts().await,
            vec![ChatMessage::from_bot(BACKEND_APOLOGY_TEXT)]
        );
    }
}
