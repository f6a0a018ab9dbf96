//! Recording [`Recipient`] double shared by the application-layer tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use relay_core::{decode_chat_message, ChatMessage};

use super::recipient::{DeliveryError, Recipient};

/// Stores every delivered frame; optionally fails every delivery.
#[derive(Default)]
pub struct RecordingRecipient {
    frames: Mutex<Vec<String>>,
    fail: AtomicBool,
    closed: AtomicBool,
}

impl RecordingRecipient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A recipient whose stream is already broken.
    pub fn failing() -> Arc<Self> {
        let r = Self::default();
        r.fail.store(true, Ordering::SeqCst);
        Arc::new(r)
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    /// Delivered frames decoded back into chat messages.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.frames()
            .iter()
            .map(|f| decode_chat_message(f).expect("recorded frame must be a chat message"))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recipient for RecordingRecipient {
    async fn deliver(&self, frame: &str) -> Result<(), DeliveryError> {
        if self.fail.load(Ordering::SeqCst) || self.is_closed() {
            return Err(DeliveryError::Transport("broken pipe".to_string()));
        }
        self.frames.lock().unwrap().push(frame.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
