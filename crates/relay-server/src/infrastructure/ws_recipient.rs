//! [`Recipient`] implementation backed by the write half of a WebSocket.
//!
//! The write half is shared between the hub (broadcasts), the connection's
//! own task (warnings and keepalive pings), so it sits behind a
//! `tokio::sync::Mutex`.  Closing a recipient also wakes the connection's
//! read loop through [`WsRecipient::closed`], which ends the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, Notify};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use crate::application::{DeliveryError, Recipient};

/// Upper bound on sending the Close frame.  A peer that stopped reading must
/// not hold up whoever is closing it.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

pub type WsSink<T> = SplitSink<WebSocketStream<T>, WsMessage>;

pub struct WsRecipient<T> {
    sink: Mutex<WsSink<T>>,
    closed: AtomicBool,
    shutdown: Notify,
}

impl<T> WsRecipient<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(sink: WsSink<T>) -> Self {
        Self {
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    /// Sends a keepalive Ping.
    ///
    /// # Errors
    ///
    /// Same as [`Recipient::deliver`].
    pub async fn ping(&self) -> Result<(), DeliveryError> {
        self.send(WsMessage::Ping(Vec::new())).await
    }

    /// Resolves once [`close`](Recipient::close) has been called.
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.shutdown.notified().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Sends a Close frame with `code` and marks the recipient closed.
    ///
    /// Idempotent; only the first call sends anything.
    pub async fn close_with(&self, code: CloseCode, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.notify_one();

        let frame = CloseFrame {
            code,
            reason: reason.to_owned().into(),
        };
        let result = tokio::time::timeout(CLOSE_TIMEOUT, async {
            let mut sink = self.sink.lock().await;
            sink.send(WsMessage::Close(Some(frame))).await?;
            sink.close().await
        })
        .await;
        match result {
            Ok(Ok(())) | Ok(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {}
            Ok(Err(e)) => debug!(error = %e, "error while closing WebSocket"),
            Err(_) => debug!("timed out sending Close frame"),
        }
    }

    async fn send(&self, msg: WsMessage) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        let mut sink = self.sink.lock().await;
        sink.send(msg).await.map_err(|e| match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => DeliveryError::Closed,
            other => DeliveryError::Transport(other.to_string()),
        })
    }
}

#[async_trait]
impl<T> Recipient for WsRecipient<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn deliver(&self, frame: &str) -> Result<(), DeliveryError> {
        self.send(WsMessage::Text(frame.to_owned())).await
    }

    async fn close(&self) {
        self.close_with(CloseCode::Normal, "").await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio::io::{duplex, DuplexStream};
    use tokio_tungstenite::tungstenite::protocol::Role;

    /// Server-side recipient plus the client end of an in-memory WebSocket.
    async fn pair() -> (WsRecipient<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (server_io, client_io) = duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let (sink, _stream) = server.split();
        (WsRecipient::new(sink), client)
    }

    #[tokio::test]
    async fn test_deliver_sends_text_frame() {
        let (recipient, mut client) = pair().await;

        recipient.deliver(r#"{"username":"A","message":"hi"}"#).await.unwrap();

        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(
            msg,
            WsMessage::Text(r#"{"username":"A","message":"hi"}"#.to_string())
        );
    }

    #[tokio::test]
    async fn test_close_sends_close_frame_and_rejects_further_delivery() {
        let (recipient, mut client) = pair().await;

        recipient.close().await;

        assert!(recipient.is_closed());
        assert!(matches!(client.next().await, Some(Ok(WsMessage::Close(_)))));
        assert_eq!(recipient.deliver("x").await, Err(DeliveryError::Closed));
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        let (recipient, _client) = pair().await;
        recipient.close_with(CloseCode::Away, "shutdown").await;
        // Must not hang.
        recipient.closed().await;
    }

    #[tokio::test]
    async fn test_ping_sends_ping_frame() {
        let (recipient, mut client) = pair().await;
        recipient.ping().await.unwrap();
        assert!(matches!(client.next().await, Some(Ok(WsMessage::Ping(_)))));
    }
}
