//! BroadcastHub: the single fan-out point for every message in the room.
//!
//! ```text
//!  connection task ─┐
//!  connection task ─┼─► HubHandle::enqueue ─► [unbounded FIFO] ─► BroadcastHub::run
//!  bot router ──────┘                                               │
//!                                                   snapshot of ConnectionRegistry
//!                                                                   │
//!                                              deliver to every recipient (concurrently)
//! ```
//!
//! There is exactly one consumer, and it finishes delivering a message to
//! every recipient before it takes the next one.  Every client therefore sees
//! the same relative order of broadcast messages.
//!
//! The queue is unbounded so that producers never wait on the consumer.  A
//! recipient that fails (or exceeds the write timeout) is unregistered at once
//! and closed on a separate task; the others still receive the message.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use relay_core::{encode_chat_message, ChatMessage, ConnectionId};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::recipient::{deliver_within, DeliveryError};
use super::registry::ConnectionRegistry;

/// Error returned when the hub is no longer consuming.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("broadcast hub has stopped")]
    Closed,
}

/// Cloneable producer side of the hub queue.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<ChatMessage>,
}

impl HubHandle {
    /// Queues a message for fan-out.  Never waits.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the consumer has stopped.
    pub fn enqueue(&self, msg: ChatMessage) -> Result<(), HubError> {
        self.tx.send(msg).map_err(|_| HubError::Closed)
    }
}

/// Result of delivering one message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: usize,
    /// Recipients that failed and were removed from the registry.
    pub removed: Vec<ConnectionId>,
}

/// Consumer side of the hub.
pub struct BroadcastHub {
    rx: mpsc::UnboundedReceiver<ChatMessage>,
    registry: Arc<ConnectionRegistry>,
    write_timeout: Duration,
}

impl BroadcastHub {
    /// Creates the hub and its first producer handle.
    pub fn new(registry: Arc<ConnectionRegistry>, write_timeout: Duration) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            rx,
            registry,
            write_timeout,
        };
        (hub, HubHandle { tx })
    }

    /// Drains the queue until every [`HubHandle`] has been dropped.
    pub async fn run(mut self) {
        info!("broadcast hub started");
        while let Some(msg) = self.rx.recv().await {
            let report = self.fan_out(&msg).await;
            debug!(
                delivered = report.delivered,
                removed = report.removed.len(),
                "broadcast delivered"
            );
        }
        info!("broadcast hub stopped");
    }

    /// Delivers `msg` to every currently registered recipient.
    pub async fn fan_out(&self, msg: &ChatMessage) -> FanOutReport {
        let frame = match encode_chat_message(msg) {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, "dropping message that cannot be encoded");
                return FanOutReport::default();
            }
        };

        let recipients = self.registry.snapshot();
        let outcomes = join_all(recipients.iter().map(|(id, recipient)| {
            let frame = frame.as_str();
            async move {
                let result = deliver_within(recipient.as_ref(), frame, self.write_timeout).await;
                (*id, result)
            }
        }))
        .await;

        let mut report = FanOutReport::default();
        for ((id, result), (_, recipient)) in outcomes.into_iter().zip(recipients) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    match e {
                        DeliveryError::Closed => debug!(conn = %id, "recipient already closed"),
                        _ => warn!(conn = %id, error = %e, "delivery failed; dropping recipient"),
                    }
                    self.registry.unregister(id);
                    // A peer that stopped reading can hold its close for a while.
                    tokio::spawn(async move { recipient.close().await });
                    report.removed.push(id);
                }
            }
        }
        report
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
