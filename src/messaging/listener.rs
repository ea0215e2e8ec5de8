use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde_json::Value;
use tracing::{trace, warn};

use crate::messaging::config::WILDCARD_ORIGIN;
use crate::messaging::envelope::{confirmation_envelope, InboundEnvelope};
use crate::messaging::transport::{MessageEvent, MessageEventHandler, MessageTarget};

/// The origin an opaque (e.g. sandboxed) sender reports. It cannot be addressed by name, so
///  replies to it go to the wildcard origin.
pub const OPAQUE_ORIGIN: &str = "null";

/// A data message as it is handed to a listener's callback
#[derive(Clone)]
pub struct ReceivedMessage {
    pub data: Value,
    /// the handle replies to this sender go to
    pub sender: Arc<dyn MessageTarget>,
    /// the sender's origin, with [OPAQUE_ORIGIN] already mapped to the wildcard origin
    pub origin: String,
}
impl Debug for ReceivedMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReceivedMessage{{origin:{:?}, data:{:?}}}", self.origin, self.data)
    }
}

pub type MessageCallback = Arc<dyn Fn(ReceivedMessage) + Send + Sync>;

/// Receives the messages sent on a single channel, passes data to the callback, and confirms
///  every accepted message (handshakes included) back to its sender.
pub struct ChannelListener {
    channel: Value,
    /// empty means 'any origin'
    origins: Vec<String>,
    callback: MessageCallback,
}
impl Debug for ChannelListener {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelListener{{channel:{:?}, origins:{:?}}}", self.channel, self.origins)
    }
}

impl ChannelListener {
    pub fn new(channel: Value, origins: Vec<String>, callback: MessageCallback) -> ChannelListener {
        ChannelListener {
            channel,
            origins,
            callback,
        }
    }

    fn is_allowed_origin(&self, origin: &str) -> bool {
        self.origins.is_empty() || self.origins.iter().any(|o| o == origin)
    }
}

impl MessageEventHandler for ChannelListener {
    fn handle_event(&self, event: &MessageEvent) {
        if !self.is_allowed_origin(&event.origin) {
            trace!(origin = ?event.origin, channel = ?self.channel, "origin is not allowed - ignoring");
            return;
        }
        let Some(source) = &event.source else {
            trace!("inbound message without a source - ignoring");
            return;
        };

        let envelope = InboundEnvelope::decode(event.data.as_ref());
        if envelope.channel() != Some(&self.channel) {
            trace!(message_id = ?envelope.message_id(), channel = ?envelope.channel(), "not for this listener's channel - ignoring");
            return;
        }

        let (message_id, data) = match envelope {
            InboundEnvelope::Handshake { message_id, endpoint, .. } => {
                trace!(?message_id, ?endpoint, "received handshake");
                (message_id, None)
            }
            InboundEnvelope::Data { message_id, data, .. } => (message_id, Some(data)),
            InboundEnvelope::Confirmation { .. } | InboundEnvelope::Unrecognized => return,
        };

        let reply_origin = if event.origin == OPAQUE_ORIGIN {
            WILDCARD_ORIGIN.to_string()
        }
        else {
            event.origin.clone()
        };

        if let Some(data) = data {
            trace!(?message_id, "received data message");
            (self.callback)(ReceivedMessage {
                data,
                sender: source.clone(),
                origin: reply_origin.clone(),
            });
        }

        if let Err(e) = source.post_message(confirmation_envelope(&self.channel, &message_id), &reply_origin, &[]) {
            warn!(?message_id, "error sending confirmation: {}", e);
        }
    }
}
