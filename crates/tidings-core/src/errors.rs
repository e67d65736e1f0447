//! Codec and transport error types.

use thiserror::Error;

use crate::protocol::MessageType;

/// Failure to turn inbound bytes into a usable [`ProtocolMessage`](crate::ProtocolMessage).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The envelope itself is not valid JSON or lacks a `type` string.
    #[error("malformed envelope: {0}")]
    Envelope(#[from] serde_json::Error),
    /// The `type` tag is not part of the protocol.
    #[error("unknown message type: {0}")]
    UnknownType(String),
    /// The `type` tag names a server-internal message a client may not send.
    #[error("message type {0} is never sent on the wire")]
    Synthetic(MessageType),
    /// A message type that requires a payload arrived without one.
    #[error("{0} message has no payload")]
    MissingPayload(MessageType),
    /// The payload does not fit the shape its type requires.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// Message type whose payload failed to decode.
        kind: MessageType,
        /// Underlying deserialization failure.
        #[source]
        source: serde_json::Error,
    },
    /// A subscription request was requested from a message that is not `start`.
    #[error("expected a start message, got {0}")]
    NotStart(MessageType),
}

impl DecodeError {
    /// Whether the message should simply be ignored rather than reported.
    ///
    /// Clients commonly send protocol types this server does not handle
    /// (`connection_init`, `ka`); those are skipped by the reader.
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::UnknownType(_))
    }
}

/// Failure to serialize an outbound message.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Server-internal messages have no wire form.
    #[error("message type {0} is never sent on the wire")]
    Synthetic(MessageType),
    /// JSON serialization failed.
    #[error("failed to serialize message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of the underlying message transport.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The peer closed the connection or the stream ended.
    #[error("connection closed")]
    Closed,
    /// Reading the next frame failed.
    #[error("receive failed: {0}")]
    Receive(String),
    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(String),
}
