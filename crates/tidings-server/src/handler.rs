//! Per-connection entry point: wires reader, session and connection tracking.

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use metrics::counter;
use tidings_core::{Executor, Notifier};
use tidings_telemetry::metrics::CONNECTIONS_TOTAL;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, instrument};

use crate::config::SubscriptionConfig;
use crate::connections::ConnectionRegistry;
use crate::reader::spawn_reader;
use crate::session::{Session, SessionOutcome};
use crate::transport::{self, MessageSink, MessageSource};

/// Serves subscription sessions for accepted connections.
#[derive(Clone)]
pub struct SubscriptionHandler {
    executor: Arc<dyn Executor>,
    notifier: Arc<dyn Notifier>,
    config: Arc<SubscriptionConfig>,
    connections: Arc<ConnectionRegistry>,
    shutdown: CancellationToken,
}

impl SubscriptionHandler {
    /// Create a handler backed by `executor` and `notifier`.
    pub fn new(
        executor: Arc<dyn Executor>,
        notifier: Arc<dyn Notifier>,
        config: SubscriptionConfig,
    ) -> Self {
        Self {
            executor,
            notifier,
            config: Arc::new(config),
            connections: Arc::new(ConnectionRegistry::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// End active sessions when `token` is cancelled.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Connection options.
    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Live connections.
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Run one connection to completion.
    ///
    /// Spawns the reader on `source`, drives the session against `sink`, then
    /// stops the reader and closes the sink.
    #[instrument(skip_all, fields(connection_id))]
    pub async fn serve<S, K>(&self, source: S, mut sink: K, origin: Option<String>) -> SessionOutcome
    where
        S: MessageSource + 'static,
        K: MessageSink,
    {
        let info = self.connections.register(origin);
        let _ = Span::current().record("connection_id", info.id().as_str());
        counter!(CONNECTIONS_TOTAL).increment(1);
        debug!(origin = info.origin(), "connection accepted");

        let (events_tx, events_rx) = mpsc::channel(self.config.event_buffer.max(1));
        let reader = spawn_reader(source, events_tx, info.id().clone());

        let session = Session::new(
            info.clone(),
            self.executor.clone(),
            self.notifier.clone(),
            self.config.clone(),
        )
        .with_shutdown(self.shutdown.clone());
        let outcome = session.run(events_rx, &mut sink).await;

        reader.abort();
        sink.close().await;
        self.connections.unregister(info.id());
        outcome
    }

    /// Run an upgraded WebSocket to completion.
    pub async fn serve_websocket(&self, socket: WebSocket, origin: Option<String>) -> SessionOutcome {
        let (source, sink) = transport::websocket::split(socket);
        self.serve(source, sink, origin).await
    }
}
