//! `graphql-ws` message envelope and codec.
//!
//! Wire shape: `{ "id": string, "type": string, "payload": <type-dependent> }`.
//!
//! Decoding happens in two phases: the outer envelope is parsed with an
//! opaque payload, then the payload is decoded into the shape its `type`
//! tag calls for. This keeps one typed [`Payload`] variant per message type
//! while still accepting whatever nested JSON clients put in `payload`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::{DecodeError, EncodeError};
use crate::execution::ExecutionResult;

/// The closed set of message types this server understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Client starts a subscription.
    Start,
    /// Client stops its subscription.
    Stop,
    /// Server delivers an execution result.
    Data,
    /// Server reports a failure; also used internally for decode errors.
    Error,
    /// Internal marker for transport loss. Never on the wire.
    Disconnected,
}

impl MessageType {
    /// Wire tag for this type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Data => "data",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "data" => Some(Self::Data),
            "error" => Some(Self::Error),
            "disconnected" => Some(Self::Disconnected),
            _ => None,
        }
    }

    /// Whether this type only exists inside the server.
    pub fn is_synthetic(self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `start` message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    /// Query document text.
    pub query: String,
    /// Variable values keyed by name. `null` or absent decodes as empty.
    #[serde(default, deserialize_with = "null_as_empty_map")]
    pub variables: Map<String, Value>,
    /// Operation to run when the document holds several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Opaque protocol extensions, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl SubscriptionRequest {
    /// Request for `query` with no variables.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Builder-style variable assignment.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        let _ = self.variables.insert(name.into(), value);
        self
    }

    /// Builder-style operation name.
    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

fn null_as_empty_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Typed payload, one variant per [`MessageType`].
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// `start`: the subscription to run.
    Start(SubscriptionRequest),
    /// `stop`: payload ignored.
    Stop,
    /// `data`: one execution result.
    Data(ExecutionResult),
    /// `error`: a human-readable message.
    Error(String),
    /// Transport loss, produced by the connection reader.
    Disconnected,
}

/// A decoded protocol message.
#[derive(Clone, Debug, PartialEq)]
pub struct ProtocolMessage {
    /// Correlates requests and responses. Empty for internal events.
    pub id: String,
    /// Type-specific payload.
    pub payload: Payload,
}

impl ProtocolMessage {
    /// `start` message.
    pub fn start(id: impl Into<String>, request: SubscriptionRequest) -> Self {
        Self {
            id: id.into(),
            payload: Payload::Start(request),
        }
    }

    /// `stop` message.
    pub fn stop(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: Payload::Stop,
        }
    }

    /// `data` message.
    pub fn data(id: impl Into<String>, result: ExecutionResult) -> Self {
        Self {
            id: id.into(),
            payload: Payload::Data(result),
        }
    }

    /// `error` message.
    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: Payload::Error(message.into()),
        }
    }

    /// Synthetic transport-loss event.
    pub fn disconnected() -> Self {
        Self {
            id: String::new(),
            payload: Payload::Disconnected,
        }
    }

    /// Type tag of this message.
    pub fn message_type(&self) -> MessageType {
        match self.payload {
            Payload::Start(_) => MessageType::Start,
            Payload::Stop => MessageType::Stop,
            Payload::Data(_) => MessageType::Data,
            Payload::Error(_) => MessageType::Error,
            Payload::Disconnected => MessageType::Disconnected,
        }
    }

    /// The subscription request carried by a `start` message.
    pub fn to_subscription_request(&self) -> Result<SubscriptionRequest, DecodeError> {
        match &self.payload {
            Payload::Start(request) => Ok(request.clone()),
            _ => Err(DecodeError::NotStart(self.message_type())),
        }
    }

    /// Decode one inbound frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        let kind = MessageType::from_tag(&envelope.kind)
            .ok_or_else(|| DecodeError::UnknownType(envelope.kind.clone()))?;
        let id = envelope.id.unwrap_or_default();
        let raw = envelope.payload.filter(|v| !v.is_null());

        let payload = match kind {
            MessageType::Start => {
                let raw = raw.ok_or(DecodeError::MissingPayload(kind))?;
                let request = serde_json::from_value(raw)
                    .map_err(|source| DecodeError::InvalidPayload { kind, source })?;
                Payload::Start(request)
            }
            MessageType::Stop => Payload::Stop,
            MessageType::Data => {
                let raw = raw.ok_or(DecodeError::MissingPayload(kind))?;
                let result = serde_json::from_value(raw)
                    .map_err(|source| DecodeError::InvalidPayload { kind, source })?;
                Payload::Data(result)
            }
            MessageType::Error => match raw {
                Some(Value::String(message)) => Payload::Error(message),
                Some(other) => Payload::Error(other.to_string()),
                None => return Err(DecodeError::MissingPayload(kind)),
            },
            MessageType::Disconnected => return Err(DecodeError::Synthetic(kind)),
        };

        Ok(Self { id, payload })
    }

    /// Encode for the wire as JSON text.
    pub fn encode(&self) -> Result<String, EncodeError> {
        let payload = match &self.payload {
            Payload::Start(request) => Some(WirePayload::Start(request)),
            Payload::Stop => None,
            Payload::Data(result) => Some(WirePayload::Data(result)),
            Payload::Error(message) => Some(WirePayload::Error(message)),
            Payload::Disconnected => {
                return Err(EncodeError::Synthetic(MessageType::Disconnected));
            }
        };
        let wire = WireMessage {
            id: &self.id,
            kind: self.message_type().as_str(),
            payload,
        };
        Ok(serde_json::to_string(&wire)?)
    }
}

/// Decode one inbound frame. See [`ProtocolMessage::decode`].
pub fn decode(bytes: &[u8]) -> Result<ProtocolMessage, DecodeError> {
    ProtocolMessage::decode(bytes)
}

/// Encode one outbound message. See [`ProtocolMessage::encode`].
pub fn encode(message: &ProtocolMessage) -> Result<String, EncodeError> {
    message.encode()
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<WirePayload<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePayload<'a> {
    Start(&'a SubscriptionRequest),
    Data(&'a ExecutionResult),
    Error(&'a str),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
