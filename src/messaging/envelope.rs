use serde_json::{Map, Value};

use crate::messaging::ids::{EndpointId, MessageId};

const FIELD_CHANNEL: &str = "channel";
const FIELD_MESSAGE_ID: &str = "messageId";
const FIELD_HANDSHAKE: &str = "handshake";
const FIELD_DATA: &str = "data";
const FIELD_RECEIVED: &str = "received";

/// What a single outbound message carries besides channel and message id. Handshakes and data
///  messages go through the same send-and-confirm path and differ only in this field.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPayload {
    Handshake(EndpointId),
    Data(Value),
}
impl OutboundPayload {
    /// `{channel, handshake, messageId}` or `{channel, data, messageId}`
    pub fn into_envelope(self, channel: &Value, message_id: &MessageId) -> Value {
        let mut envelope = Map::new();
        match self {
            OutboundPayload::Handshake(endpoint) => {
                envelope.insert(FIELD_HANDSHAKE.to_string(), Value::String(endpoint.to_string()));
            }
            OutboundPayload::Data(data) => {
                envelope.insert(FIELD_DATA.to_string(), data);
            }
        }
        envelope.insert(FIELD_CHANNEL.to_string(), channel.clone());
        envelope.insert(FIELD_MESSAGE_ID.to_string(), Value::String(message_id.to_string()));
        Value::Object(envelope)
    }

    pub fn is_handshake(&self) -> bool {
        matches!(self, OutboundPayload::Handshake(_))
    }
}

/// `{channel, messageId, received: true}` - the reply a listener sends for every accepted message
pub fn confirmation_envelope(channel: &Value, message_id: &MessageId) -> Value {
    let mut envelope = Map::new();
    envelope.insert(FIELD_CHANNEL.to_string(), channel.clone());
    envelope.insert(FIELD_MESSAGE_ID.to_string(), Value::String(message_id.to_string()));
    envelope.insert(FIELD_RECEIVED.to_string(), Value::Bool(true));
    Value::Object(envelope)
}


/// The confirmation view of an inbound payload: a string `messageId` and `received: true`.
///
/// This is decoded independently of [InboundEnvelope] because other fields do not matter to the
///  confirmation side. A payload that also carries `data` is still a confirmation here, and it is
///  still a data message to a listener.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundConfirmation {
    pub channel: Option<Value>,
    pub message_id: MessageId,
}
impl InboundConfirmation {
    pub fn decode(data: Option<&Value>) -> Option<InboundConfirmation> {
        let Some(Value::Object(fields)) = data else {
            return None;
        };
        let Some(Value::String(message_id)) = fields.get(FIELD_MESSAGE_ID) else {
            return None;
        };
        if fields.get(FIELD_RECEIVED) != Some(&Value::Bool(true)) {
            return None;
        }
        Some(InboundConfirmation {
            channel: fields.get(FIELD_CHANNEL).cloned(),
            message_id: MessageId::from(message_id.as_str()),
        })
    }
}


/// An inbound payload as a listener sees it, decoded once at the dispatcher boundary.
///
/// The inbound stream is shared with arbitrary other traffic, so anything that does not have the
///  shape of one of this protocol's messages decodes as [InboundEnvelope::Unrecognized] rather
///  than as an error. `channel` is `None` if the field is absent, which is different from an
///  explicit `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEnvelope {
    Handshake {
        channel: Option<Value>,
        message_id: MessageId,
        endpoint: Value,
    },
    /// A data message. If the payload carries a handshake marker as well, it is retained here:
    ///  the data is still delivered.
    Data {
        channel: Option<Value>,
        message_id: MessageId,
        data: Value,
        handshake: Option<Value>,
    },
    Confirmation {
        channel: Option<Value>,
        message_id: MessageId,
    },
    Unrecognized,
}

impl InboundEnvelope {
    pub fn decode(data: Option<&Value>) -> InboundEnvelope {
        let Some(Value::Object(fields)) = data else {
            return InboundEnvelope::Unrecognized;
        };
        let Some(Value::String(message_id)) = fields.get(FIELD_MESSAGE_ID) else {
            return InboundEnvelope::Unrecognized;
        };
        let message_id = MessageId::from(message_id.as_str());
        let channel = fields.get(FIELD_CHANNEL).cloned();

        if let Some(data) = fields.get(FIELD_DATA) {
            return InboundEnvelope::Data {
                channel,
                message_id,
                data: data.clone(),
                handshake: fields.get(FIELD_HANDSHAKE).cloned(),
            };
        }
        if let Some(endpoint) = fields.get(FIELD_HANDSHAKE) {
            return InboundEnvelope::Handshake {
                channel,
                message_id,
                endpoint: endpoint.clone(),
            };
        }
        if fields.get(FIELD_RECEIVED) == Some(&Value::Bool(true)) {
            return InboundEnvelope::Confirmation {
                channel,
                message_id,
            };
        }
        InboundEnvelope::Unrecognized
    }

    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            InboundEnvelope::Handshake { message_id, .. } => Some(message_id),
            InboundEnvelope::Data { message_id, .. } => Some(message_id),
            InboundEnvelope::Confirmation { message_id, .. } => Some(message_id),
            InboundEnvelope::Unrecognized => None,
        }
    }

    pub fn channel(&self) -> Option<&Value> {
        match self {
            InboundEnvelope::Handshake { channel, .. } => channel.as_ref(),
            InboundEnvelope::Data { channel, .. } => channel.as_ref(),
            InboundEnvelope::Confirmation { channel, .. } => channel.as_ref(),
            InboundEnvelope::Unrecognized => None,
        }
    }
}
