use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use serde_json::Value;
use tokio::time::Instant;

use crate::messaging::ids::MessageId;
use crate::messaging::transport::MessageTarget;

/// A single call to [TrackingMockTarget::post_message], with the (possibly paused) time at which
///  it happened
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    pub message: Value,
    pub target_origin: String,
    pub transfer: Vec<Bytes>,
    pub at: Instant,
}
impl PostedMessage {
    pub fn message_id(&self) -> Option<MessageId> {
        self.message.get("messageId")
            .and_then(|id| id.as_str())
            .map(MessageId::from)
    }
}

/// A [MessageTarget] that delivers nothing, recording every posted message instead
#[derive(Debug, Default)]
pub struct TrackingMockTarget {
    tracker: Mutex<Vec<PostedMessage>>,
}
impl TrackingMockTarget {
    pub fn new() -> Arc<TrackingMockTarget> {
        Default::default()
    }

    fn tracker(&self) -> MutexGuard<'_, Vec<PostedMessage>> {
        self.tracker.lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// returns posted messages, leaving the internal buffer untouched
    pub fn posted(&self) -> Vec<PostedMessage> {
        self.tracker().clone()
    }

    /// returns posted messages, clearing the internal buffer
    pub fn take_posted(&self) -> Vec<PostedMessage> {
        std::mem::take(&mut *self.tracker())
    }

    pub fn num_posted(&self) -> usize {
        self.tracker().len()
    }

    pub fn last_message_id(&self) -> Option<MessageId> {
        self.tracker().last()
            .and_then(|p| p.message_id())
    }

    pub fn assert_no_remaining_messages(&self) {
        assert!(self.tracker().is_empty(), "unexpected messages: {:?}", self.tracker());
    }
}

impl MessageTarget for TrackingMockTarget {
    fn post_message(&self, message: Value, target_origin: &str, transfer: &[Bytes]) -> anyhow::Result<()> {
        self.tracker().push(PostedMessage {
            message,
            target_origin: target_origin.to_string(),
            transfer: transfer.to_vec(),
            at: Instant::now(),
        });
        Ok(())
    }
}
