//! Connection reader task.
//!
//! Turns raw frames into session events:
//! - `start` and `stop` are forwarded; `stop` also ends the reader
//! - undecodable frames become `error` events and reading continues
//! - unknown message types (`connection_init`, `ka`, ...) are skipped
//! - a transport failure produces one `disconnected` event and ends the reader

use tidings_core::{ConnectionId, MessageType, ProtocolMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::transport::MessageSource;

/// Spawn [`run_reader`] on the current runtime.
pub fn spawn_reader<S>(
    source: S,
    events: mpsc::Sender<ProtocolMessage>,
    connection_id: ConnectionId,
) -> JoinHandle<()>
where
    S: MessageSource + 'static,
{
    tokio::spawn(run_reader(source, events, connection_id))
}

/// Read `source` until it fails, a `stop` arrives, or the session is gone.
pub async fn run_reader<S: MessageSource>(
    mut source: S,
    events: mpsc::Sender<ProtocolMessage>,
    connection_id: ConnectionId,
) {
    loop {
        let bytes = match source.recv().await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(%connection_id, error = %e, "transport read ended");
                let _ = events.send(ProtocolMessage::disconnected()).await;
                return;
            }
        };

        let (event, last) = match ProtocolMessage::decode(&bytes) {
            Ok(msg) => match msg.message_type() {
                MessageType::Start => (msg, false),
                MessageType::Stop => (msg, true),
                other => {
                    debug!(%connection_id, kind = %other, "ignoring server-bound message type");
                    continue;
                }
            },
            Err(e) if e.is_ignorable() => {
                trace!(%connection_id, error = %e, "skipping unsupported message");
                continue;
            }
            Err(e) => {
                warn!(%connection_id, error = %e, "undecodable client message");
                (ProtocolMessage::error("", e.to_string()), false)
            }
        };

        if events.send(event).await.is_err() {
            trace!(%connection_id, "session gone, reader exiting");
            return;
        }
        if last {
            return;
        }
    }
}
