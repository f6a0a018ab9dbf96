//! The write side of a connection, as seen by the registry and the hub.
//!
//! The hub never touches sockets directly.  It holds `Arc<dyn Recipient>`
//! handles and calls [`Recipient::deliver`]; the WebSocket implementation lives
//! in the infrastructure layer and tests substitute recording doubles.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Failure to write one frame to one recipient.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The recipient's stream was already closed.
    #[error("recipient closed")]
    Closed,

    /// The write did not complete within the configured bound.
    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    /// The underlying transport reported an error.
    #[error("transport error: {0}")]
    Transport(String),
}

/// A connection that can receive text frames.
#[async_trait]
pub trait Recipient: Send + Sync {
    /// Writes one text frame.
    async fn deliver(&self, frame: &str) -> Result<(), DeliveryError>;

    /// Closes the write side.  Errors are swallowed: the connection is being
    /// torn down anyway.
    async fn close(&self);
}

/// Runs [`Recipient::deliver`] bounded by `limit`.
///
/// # Errors
///
/// Returns [`DeliveryError::Timeout`] when the write is still pending after
/// `limit`, or the recipient's own error.
pub async fn deliver_within(
    recipient: &dyn Recipient,
    frame: &str,
    limit: Duration,
) -> Result<(), DeliveryError> {
    match tokio::time::timeout(limit, recipient.deliver(frame)).await {
        Ok(result) => result,
        Err(_) => Err(DeliveryError::Timeout(limit)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct Stalled;

    #[async_trait]
    impl Recipient for Stalled {
        async fn deliver(&self, _frame: &str) -> Result<(), DeliveryError> {
            std::future::pending().await
        }

        async fn close(&self) {}
    }

    struct Immediate;

    #[async_trait]
    impl Recipient for Immediate {
        async fn deliver(&self, _frame: &str) -> Result<(), DeliveryError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_deliver_within_times_out_stalled_recipient() {
        let limit = Duration::from_secs(5);
        let result = deliver_within(&Stalled, "{}", limit).await;
        assert_eq!(result, Err(DeliveryError::Timeout(limit)));
    }

    #[tokio::test]
    async fn test_deliver_within_passes_through_success() {
        tokio_test::assert_ok!(deliver_within(&Immediate, "{}", Duration::from_secs(1)).await);
    }
}
