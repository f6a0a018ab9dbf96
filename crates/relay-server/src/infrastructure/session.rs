//! One registered client connection: the read loop and per-message pipeline.
//!
//! ```text
//! text frame ─► decode JSON ─► IngressGuard ─┬─ rejected ─► warning to sender only
//!                                            └─ accepted ─► echo to hub ─► BotRouter
//! ```
//!
//! The loop also drives the keepalive: a Ping every `ping_interval`, and an
//! idle deadline that every inbound frame (Pongs included) pushes back.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use relay_core::{decode_chat_message, encode_chat_message, ChatMessage, ConnectionId, SessionId};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::error::ProtocolError as WsProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace};

use super::ws_recipient::WsRecipient;
use super::ws_server::RelayState;
use crate::application::{deliver_within, AdmissionError, HubError, IngressError, RegistryError};

/// Reasons a connection ends other than a clean close.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Refused during the upgrade (400 or 429 already sent).
    #[error("admission refused: {0}")]
    Refused(AdmissionError),

    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    #[error("frame exceeds the size limit: {0}")]
    FrameTooLarge(String),

    #[error("WebSocket protocol violation: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed chat message: {0}")]
    MalformedMessage(#[from] relay_core::ProtocolError),

    #[error("no traffic for {0:?}")]
    IdleTimeout(Duration),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Removed from the registry by the hub after a failed delivery.
    #[error("connection evicted after a failed delivery")]
    Evicted,

    #[error(transparent)]
    Hub(#[from] HubError),
}

impl SessionError {
    /// Close code sent to the client when the session ends with this error.
    fn close_code(&self) -> CloseCode {
        match self {
            SessionError::FrameTooLarge(_) => CloseCode::Size,
            SessionError::Protocol(_) | SessionError::MalformedMessage(_) => CloseCode::Unsupported,
            SessionError::IdleTimeout(_) => CloseCode::Away,
            SessionError::Hub(_) => CloseCode::Away,
            _ => CloseCode::Error,
        }
    }
}

pub struct Session<T> {
    conn: ConnectionId,
    session: SessionId,
    recipient: Arc<WsRecipient<T>>,
    state: Arc<RelayState>,
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        conn: ConnectionId,
        session: SessionId,
        recipient: Arc<WsRecipient<T>>,
        state: Arc<RelayState>,
    ) -> Self {
        Self {
            conn,
            session,
            recipient,
            state,
        }
    }

    /// Reads frames until the client leaves, the connection fails or it goes
    /// idle.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] for every exit except a clean close.
    pub async fn run(
        &self,
        mut source: SplitStream<WebSocketStream<T>>,
    ) -> Result<(), SessionError> {
        let timeouts = &self.state.config.timeouts;
        let idle = sleep(timeouts.idle);
        tokio::pin!(idle);
        let mut keepalive =
            interval_at(Instant::now() + timeouts.ping_interval, timeouts.ping_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = source.next() => {
                    let frame = match frame {
                        Some(Ok(f)) => f,
                        Some(Err(e)) => return classify(e),
                        None => return Ok(()),
                    };
                    idle.as_mut().reset(Instant::now() + timeouts.idle);

                    match frame {
                        WsMessage::Text(text) => self.handle_text(&text).await?,
                        WsMessage::Binary(_) => {
                            return Err(SessionError::Protocol(
                                "binary frames are not supported".to_string(),
                            ))
                        }
                        WsMessage::Close(_) => return Ok(()),
                        // Pong replies to Pings are queued by tungstenite itself.
                        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
                    }
                }
                _ = &mut idle => return Err(SessionError::IdleTimeout(timeouts.idle)),
                _ = keepalive.tick() => {
                    trace!(conn = %self.conn, "keepalive ping");
                    self.recipient
                        .ping()
                        .await
                        .map_err(|e| SessionError::Transport(e.to_string()))?;
                }
                _ = self.recipient.closed() => return Err(SessionError::Evicted),
            }
        }
    }

    /// Sends the Close frame that matches how the session ended.
    pub async fn finish(&self, result: &Result<(), SessionError>) {
        match result {
            Ok(()) => self.recipient.close_with(CloseCode::Normal, "").await,
            Err(SessionError::Evicted) => {}
            Err(e) => self.recipient.close_with(e.close_code(), "").await,
        }
    }

    async fn handle_text(&self, text: &str) -> Result<(), SessionError> {
        let msg = decode_chat_message(text)?;

        if let Err(rejection) = self.state.guard.check_message(self.conn, &msg) {
            debug!(conn = %self.conn, error = %rejection, "message rejected");
            return match rejection.warning() {
                Some(text) => self.warn_sender(text).await,
                None => match rejection {
                    IngressError::NotRegistered(_) => Err(SessionError::Evicted),
                    _ => Ok(()),
                },
            };
        }

        let echoed = ChatMessage::new(
            msg.username.clone(),
            self.state.sanitizer.sanitize(&msg.message).into_owned(),
        );
        self.state.hub.enqueue(echoed)?;

        let outcome = self.state.router.dispatch(&self.session, &msg.message).await;
        trace!(conn = %self.conn, ?outcome, "message routed");
        Ok(())
    }

    /// Sends an advisory message to this connection only.
    async fn warn_sender(&self, text: String) -> Result<(), SessionError> {
        let frame = encode_chat_message(&ChatMessage::from_server(text))
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        deliver_within(
            self.recipient.as_ref(),
            &frame,
            self.state.config.timeouts.write,
        )
        .await
        .map_err(|e| SessionError::Transport(e.to_string()))
    }
}

/// Maps a read error to the session outcome.  A peer that vanishes without a
/// closing handshake is treated as an ordinary disconnect.
fn classify(e: WsError) -> Result<(), SessionError> {
    match e {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(WsProtocolError::ResetWithoutClosingHandshake) => Ok(()),
        WsError::Capacity(c) => Err(SessionError::FrameTooLarge(c.to_string())),
        WsError::Protocol(p) => Err(SessionError::Protocol(p.to_string())),
        WsError::Utf8 => Err(SessionError::Protocol("invalid UTF-8 in text frame".to_string())),
        other => Err(SessionError::Transport(other.to_string())),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
