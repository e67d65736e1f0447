//! Axum WebSocket adapter.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tidings_core::TransportError;
use tracing::trace;

use super::{MessageSink, MessageSource};

/// Reading half of an upgraded socket.
pub struct WsSource {
    stream: SplitStream<WebSocket>,
}

/// Writing half of an upgraded socket.
pub struct WsSink {
    sink: SplitSink<WebSocket, Message>,
}

/// Split an upgraded socket into transport halves.
pub fn split(socket: WebSocket) -> (WsSource, WsSink) {
    let (sink, stream) = socket.split();
    (WsSource { stream }, WsSink { sink })
}

#[async_trait]
impl MessageSource for WsSource {
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().as_bytes().to_vec()),
                Some(Ok(Message::Binary(bytes))) => return Ok(bytes.to_vec()),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => trace!("control frame"),
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Err(e)) => return Err(TransportError::Receive(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}
