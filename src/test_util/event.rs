use std::sync::Arc;

use serde_json::{json, Value};

use crate::messaging::ids::MessageId;
use crate::messaging::transport::{MessageEvent, MessageTarget};

pub fn confirmation_event(channel: Value, message_id: &MessageId, origin: &str, source: Option<Arc<dyn MessageTarget>>) -> MessageEvent {
    MessageEvent {
        data: Some(json!({
            "channel": channel,
            "messageId": message_id.as_str(),
            "received": true,
        })),
        origin: origin.to_string(),
        source,
    }
}

pub fn data_event(channel: Value, message_id: &str, data: Value, origin: &str, source: Option<Arc<dyn MessageTarget>>) -> MessageEvent {
    MessageEvent {
        data: Some(json!({
            "channel": channel,
            "messageId": message_id,
            "data": data,
        })),
        origin: origin.to_string(),
        source,
    }
}

pub fn handshake_event(channel: Value, message_id: &str, endpoint: &str, origin: &str, source: Option<Arc<dyn MessageTarget>>) -> MessageEvent {
    MessageEvent {
        data: Some(json!({
            "channel": channel,
            "messageId": message_id,
            "handshake": endpoint,
        })),
        origin: origin.to_string(),
        source,
    }
}
