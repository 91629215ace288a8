//! Protocol envelopes.
//!
//! Every message this protocol emits is wrapped as
//! `{ "__interframe__": { "id": ..., "type": ..., ...fields } }`.
//! Receivers that do not find the protocol key treat the message as foreign.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Namespace key carried by every envelope.
pub const PROTOCOL_KEY: &str = "__interframe__";

/// Globally unique message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(format!("uid_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// What a message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Invoke something on the other side.
    Request,
    /// Acknowledge that a request arrived.
    Ack,
    /// Result of a request.
    Response,
}

/// A caller-supplied message, before it gets an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Anything else the caller wants to carry (name, hash, data, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Message {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            fields: Map::new(),
        }
    }

    /// Create a request message for the named handler.
    pub fn request(name: impl Into<String>, data: Value) -> Self {
        Self::new(MessageKind::Request)
            .with_field("name", Value::String(name.into()))
            .with_field("data", data)
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// A message with its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: MessageId,
    #[serde(flatten)]
    pub message: Message,
}

/// An envelope nested under the protocol key, as it goes over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "__interframe__")]
    pub envelope: Envelope,
}

impl WireMessage {
    /// Wrap `message` in a freshly identified envelope.
    ///
    /// The generated id always wins over an `id` field supplied by the caller.
    pub fn encode(mut message: Message) -> Self {
        message.fields.remove("id");
        Self {
            envelope: Envelope {
                id: MessageId::generate(),
                message,
            },
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.envelope.id
    }

    pub fn kind(&self) -> MessageKind {
        self.envelope.message.kind
    }

    pub fn to_value(&self) -> Result<Value, EnvelopeError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a received value.
    ///
    /// Returns `Ok(None)` when the value does not carry the protocol key.
    pub fn decode(value: &Value) -> Result<Option<Self>, EnvelopeError> {
        if value.get(PROTOCOL_KEY).is_none() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value.clone())?))
    }

    /// Decode a received JSON string. Non-JSON input counts as foreign traffic.
    pub fn decode_str(data: &str) -> Result<Option<Self>, EnvelopeError> {
        match serde_json::from_str::<Value>(data) {
            Ok(value) => Self::decode(&value),
            Err(_) => Ok(None),
        }
    }
}

/// Error encoding or decoding an envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message can not be sent to {target}: {reason}")]
    Unserializable { target: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_nests_under_protocol_key() {
        let wire = WireMessage::encode(Message::request("ping", json!({ "n": 1 })));
        let value = wire.to_value().unwrap();

        let inner = value.get(PROTOCOL_KEY).unwrap();
        assert_eq!(inner["type"], "request");
        assert_eq!(inner["name"], "ping");
        assert_eq!(inner["data"]["n"], 1);
        assert_eq!(inner["id"], wire.id().as_str());
    }

    #[test]
    fn ids_are_unique() {
        let a = WireMessage::encode(Message::new(MessageKind::Ack));
        let b = WireMessage::encode(Message::new(MessageKind::Ack));
        assert_ne!(a.id(), b.id());
        assert!(a.id().as_str().starts_with("uid_"));
    }

    #[test]
    fn caller_id_does_not_override() {
        let message = Message::new(MessageKind::Response).with_field("id", json!("mine"));
        let wire = WireMessage::encode(message);
        assert_ne!(wire.id().as_str(), "mine");
        assert!(wire.envelope.message.field("id").is_none());
    }

    #[test]
    fn decode_ignores_foreign_traffic() {
        assert!(WireMessage::decode(&json!({ "hello": "world" })).unwrap().is_none());
        assert!(WireMessage::decode_str("not json").unwrap().is_none());
    }

    #[test]
    fn decode_reads_envelope() {
        let wire = WireMessage::encode(Message::request("ping", json!(null)));
        let json = wire.to_json().unwrap();

        let decoded = WireMessage::decode_str(&json).unwrap().unwrap();
        assert_eq!(decoded.id(), wire.id());
        assert_eq!(decoded.kind(), MessageKind::Request);
        assert_eq!(decoded.envelope.message.field("name"), Some(&json!("ping")));
    }

    #[test]
    fn decode_rejects_malformed_envelope() {
        let result = WireMessage::decode(&json!({ PROTOCOL_KEY: { "type": "bogus" } }));
        assert!(result.is_err());
    }
}
