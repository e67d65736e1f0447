//! Channel-backed transport for driving sessions without sockets.

use async_trait::async_trait;
use tidings_core::{ProtocolMessage, TransportError};
use tokio::sync::mpsc;

use super::{MessageSink, MessageSource};

/// Server-side reading half.
pub struct MemorySource {
    inbound: mpsc::Receiver<Result<Vec<u8>, TransportError>>,
}

/// Server-side writing half.
pub struct MemorySink {
    outbound: mpsc::Sender<String>,
}

/// The peer's end: feeds inbound frames and observes outbound ones.
pub struct MemoryClient {
    inbound: Option<mpsc::Sender<Result<Vec<u8>, TransportError>>>,
    outbound: mpsc::Receiver<String>,
}

/// Create a connected transport. `capacity` bounds both directions.
pub fn pair(capacity: usize) -> (MemorySource, MemorySink, MemoryClient) {
    let (in_tx, in_rx) = mpsc::channel(capacity);
    let (out_tx, out_rx) = mpsc::channel(capacity);
    (
        MemorySource { inbound: in_rx },
        MemorySink { outbound: out_tx },
        MemoryClient {
            inbound: Some(in_tx),
            outbound: out_rx,
        },
    )
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        self.inbound.recv().await.unwrap_or(Err(TransportError::Closed))
    }
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(text)
            .await
            .map_err(|_| TransportError::Send("peer dropped".into()))
    }
}

impl MemoryClient {
    /// Send a raw text frame. Returns `false` once the server side is gone.
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.push(Ok(text.into().into_bytes())).await
    }

    /// Encode and send a protocol message.
    pub async fn send(&self, message: &ProtocolMessage) -> bool {
        match message.encode() {
            Ok(text) => self.send_text(text).await,
            Err(_) => false,
        }
    }

    /// Make the server's next read fail with `error`.
    pub async fn fail(&self, error: TransportError) -> bool {
        self.push(Err(error)).await
    }

    /// Close the inbound direction; the server reads [`TransportError::Closed`].
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Stop accepting outbound frames; further server sends fail.
    pub fn stop_reading(&mut self) {
        self.outbound.close();
    }

    /// Next raw outbound frame, or `None` once the server side closed.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Next outbound frame decoded as a protocol message.
    pub async fn recv(&mut self) -> Option<ProtocolMessage> {
        let text = self.recv_text().await?;
        ProtocolMessage::decode(text.as_bytes()).ok()
    }

    async fn push(&self, frame: Result<Vec<u8>, TransportError>) -> bool {
        match &self.inbound {
            Some(tx) => tx.send(frame).await.is_ok(),
            None => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
