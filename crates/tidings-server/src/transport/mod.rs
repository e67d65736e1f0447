//! Message transport port.
//!
//! A connection is split into a [`MessageSource`] owned by the reader task
//! and a [`MessageSink`] owned by the session. Adapters exist for Axum
//! WebSockets ([`websocket`]) and in-process channels ([`memory`]).

pub mod memory;
pub mod websocket;

use async_trait::async_trait;
use tidings_core::TransportError;

/// Inbound half of a connection.
#[async_trait]
pub trait MessageSource: Send {
    /// Next complete frame. Control frames are skipped; a closed peer yields
    /// [`TransportError::Closed`].
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError>;
}

/// Outbound half of a connection.
#[async_trait]
pub trait MessageSink: Send {
    /// Write one text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Best-effort close. Errors are ignored.
    async fn close(&mut self) {}
}
