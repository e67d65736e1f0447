//! Subscription session state machine.
//!
//! One session per connection:
//!
//! ```text
//! AwaitingStart ──start──▶ Validating ──ok──▶ Streaming ──stop/disconnect──▶ Terminating ──▶ Closed
//!       │                      │                  │
//!       └─timeout/not start────┴──strict error────┴──send failed/fatal result──────────────▶ Closed
//! ```
//!
//! The session reads client events forwarded by the reader task and
//! notification payloads handed over by its notifier callback. Every exit
//! path unsubscribes each registered topic exactly once with the same
//! callback that was subscribed.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use serde_json::Value;
use tidings_core::{
    ConnectionId, ExecutionContext, ExecutionResult, Executor, NotificationCallback, Notifier,
    Payload, ProtocolMessage, SubscriptionRequest, TopicSink, TransportError,
};
use tidings_telemetry::metrics::{
    DATA_MESSAGES_TOTAL, NOTIFICATIONS_DROPPED_TOTAL, SESSION_DURATION_SECONDS, SESSIONS_ACTIVE,
    START_TIMEOUTS_TOTAL, TOPIC_SUBSCRIPTIONS_TOTAL,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{SubscriptionConfig, ValidationPolicy};
use crate::connections::ConnectionInfo;
use crate::topics::TopicRegistry;
use crate::transport::MessageSink;

// ─────────────────────────────────────────────────────────────────────────────
// States and outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle states of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Waiting for the client's `start`.
    AwaitingStart,
    /// Running the dry run that registers topics.
    Validating,
    /// Re-executing on every notification.
    Streaming,
    /// Unsubscribing from the notifier.
    Terminating,
    /// Done.
    Closed,
}

impl SessionState {
    /// Lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingStart => "awaiting_start",
            Self::Validating => "validating",
            Self::Streaming => "streaming",
            Self::Terminating => "terminating",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// No client message within the start timeout.
    StartTimeout,
    /// The first client message was not a usable `start`.
    InvalidStart,
    /// The dry run reported errors under [`ValidationPolicy::Strict`].
    ValidationFailed,
    /// The client sent `stop`.
    Stopped,
    /// The transport failed or the peer went away.
    Disconnected,
    /// Writing a message to the client failed.
    SendFailed,
    /// An execution produced no data at all.
    FatalResult,
    /// The server is shutting down.
    Shutdown,
}

impl EndReason {
    /// Snake-case label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartTimeout => "start_timeout",
            Self::InvalidStart => "invalid_start",
            Self::ValidationFailed => "validation_failed",
            Self::Stopped => "stopped",
            Self::Disconnected => "disconnected",
            Self::SendFailed => "send_failed",
            Self::FatalResult => "fatal_result",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary returned when a session finishes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Why it ended.
    pub reason: EndReason,
    /// `data` messages successfully written.
    pub data_sent: u64,
    /// Topics that were unsubscribed during cleanup, sorted.
    pub topics: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// One subscription session. Consumed by [`Session::run`].
pub struct Session {
    info: Arc<ConnectionInfo>,
    executor: Arc<dyn Executor>,
    notifier: Arc<dyn Notifier>,
    config: Arc<SubscriptionConfig>,
    topics: TopicRegistry,
    callback: NotificationCallback,
    notifications: mpsc::Receiver<Value>,
    shutdown: CancellationToken,
    data_sent: u64,
}

impl Session {
    /// Create a session for the connection described by `info`.
    pub fn new(
        info: Arc<ConnectionInfo>,
        executor: Arc<dyn Executor>,
        notifier: Arc<dyn Notifier>,
        config: Arc<SubscriptionConfig>,
    ) -> Self {
        let (tx, notifications) = mpsc::channel(config.notification_buffer.max(1));
        let connection_id = info.id().clone();
        let callback = NotificationCallback::new(info.id().as_str(), move |data| {
            match tx.try_send(data) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    counter!(NOTIFICATIONS_DROPPED_TOTAL).increment(1);
                    warn!(%connection_id, "notification buffer full, dropping payload");
                }
                Err(TrySendError::Closed(_)) => {
                    trace!(%connection_id, "notification after session end");
                }
            }
        });

        Self {
            info,
            executor,
            notifier,
            config,
            topics: TopicRegistry::new(),
            callback,
            notifications,
            shutdown: CancellationToken::new(),
            data_sent: 0,
        }
    }

    /// End the session (with cleanup) when `token` is cancelled.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Connection this session serves.
    pub fn connection_id(&self) -> &ConnectionId {
        self.info.id()
    }

    /// The callback this session registers on the notifier.
    pub fn callback(&self) -> &NotificationCallback {
        &self.callback
    }

    /// Drive the session to completion.
    ///
    /// `events` carries client messages from the reader task; `sink` receives
    /// every outbound message.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ProtocolMessage>,
        sink: &mut dyn MessageSink,
    ) -> SessionOutcome {
        let started = Instant::now();
        gauge!(SESSIONS_ACTIVE).increment(1.0);

        let reason = self.drive(&mut events, sink).await;
        let topics = self.cleanup();
        self.info.set_state(SessionState::Closed);

        gauge!(SESSIONS_ACTIVE).decrement(1.0);
        histogram!(SESSION_DURATION_SECONDS, "reason" => reason.as_str())
            .record(started.elapsed().as_secs_f64());
        info!(
            connection_id = %self.info.id(),
            %reason,
            data_sent = self.data_sent,
            topics = topics.len(),
            "session closed"
        );

        SessionOutcome {
            reason,
            data_sent: self.data_sent,
            topics,
        }
    }

    async fn drive(
        &mut self,
        events: &mut mpsc::Receiver<ProtocolMessage>,
        sink: &mut dyn MessageSink,
    ) -> EndReason {
        self.info.set_state(SessionState::AwaitingStart);
        let waited = tokio::select! {
            () = self.shutdown.cancelled() => return EndReason::Shutdown,
            waited = tokio::time::timeout(self.config.start_timeout, events.recv()) => waited,
        };
        let first = match waited {
            Err(_) => {
                counter!(START_TIMEOUTS_TOTAL).increment(1);
                debug!(connection_id = %self.connection_id(), "no start message before timeout");
                return EndReason::StartTimeout;
            }
            Ok(None) => return EndReason::Disconnected,
            Ok(Some(first)) => first,
        };
        let request = match first.to_subscription_request() {
            Ok(request) => request,
            Err(e) => {
                debug!(connection_id = %self.info.id(), error = %e, "first message is not a start");
                return match first.payload {
                    Payload::Disconnected => EndReason::Disconnected,
                    _ => EndReason::InvalidStart,
                };
            }
        };
        let id = first.id;

        self.info.set_state(SessionState::Validating);
        let dry_run = self.execute(&request, None);
        if dry_run.has_errors() {
            match self.config.validation {
                ValidationPolicy::Strict => {
                    let summary = dry_run.error_summary();
                    warn!(connection_id = %self.info.id(), errors = %summary, "subscription rejected");
                    let _ = self.send(sink, &ProtocolMessage::error(id, summary)).await;
                    return EndReason::ValidationFailed;
                }
                ValidationPolicy::Lenient => {
                    debug!(
                        connection_id = %self.info.id(),
                        errors = %dry_run.error_summary(),
                        "dry run reported errors, streaming anyway"
                    );
                }
            }
        }

        self.info.set_state(SessionState::Streaming);
        debug!(
            connection_id = %self.info.id(),
            topics = ?self.topics.all_topics(),
            "streaming"
        );
        loop {
            tokio::select! {
                Some(payload) = self.notifications.recv() => {
                    let result = self.execute(&request, Some(&payload));
                    let fatal = result.is_fatal();
                    if self.send(sink, &ProtocolMessage::data(id.as_str(), result)).await.is_err() {
                        return EndReason::SendFailed;
                    }
                    self.data_sent += 1;
                    counter!(DATA_MESSAGES_TOTAL).increment(1);
                    if fatal {
                        return EndReason::FatalResult;
                    }
                }
                event = events.recv() => match event.map(|e| e.payload) {
                    None | Some(Payload::Disconnected) => return EndReason::Disconnected,
                    Some(Payload::Stop) => return EndReason::Stopped,
                    Some(Payload::Error(message)) => {
                        warn!(connection_id = %self.info.id(), error = %message, "ignoring bad client message");
                    }
                    Some(Payload::Start(_)) => {
                        debug!(connection_id = %self.info.id(), "ignoring start on active session");
                    }
                    Some(Payload::Data(_)) => {}
                },
                () = self.shutdown.cancelled() => return EndReason::Shutdown,
            }
        }
    }

    fn execute(&self, request: &SubscriptionRequest, root: Option<&Value>) -> ExecutionResult {
        let topics = SessionTopics {
            connection_id: self.info.id(),
            registry: &self.topics,
            notifier: self.notifier.as_ref(),
            callback: &self.callback,
        };
        let ctx = match root {
            Some(root) => ExecutionContext::triggered(self.info.id(), &topics, root),
            None => ExecutionContext::dry_run(self.info.id(), &topics),
        };
        self.executor.execute(request, &ctx)
    }

    async fn send(
        &self,
        sink: &mut dyn MessageSink,
        message: &ProtocolMessage,
    ) -> Result<(), TransportError> {
        let text = message.encode().map_err(|e| {
            error!(connection_id = %self.info.id(), error = %e, "failed to encode message");
            TransportError::Send(e.to_string())
        })?;
        sink.send(text).await.inspect_err(|e| {
            debug!(connection_id = %self.info.id(), error = %e, "send failed");
        })
    }

    fn cleanup(&self) -> Vec<String> {
        self.info.set_state(SessionState::Terminating);
        let topics = self.topics.take_all();
        for topic in &topics {
            self.notifier.unsubscribe(topic, &self.callback);
            debug!(connection_id = %self.info.id(), topic, "unsubscribed");
        }
        topics.into_iter().collect()
    }
}

/// Topic-interest sink handed to the executor.
struct SessionTopics<'a> {
    connection_id: &'a ConnectionId,
    registry: &'a TopicRegistry,
    notifier: &'a dyn Notifier,
    callback: &'a NotificationCallback,
}

impl TopicSink for SessionTopics<'_> {
    fn subscribe(&self, topic: &str) {
        if self.registry.mark_subscribed(topic) {
            self.notifier.subscribe(topic, self.callback.clone());
            counter!(TOPIC_SUBSCRIPTIONS_TOTAL).increment(1);
            debug!(connection_id = %self.connection_id, topic, "subscribed");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{self, MemoryClient};
    use mockall::mock;
    use mockall::predicate::{always, eq};
    use serde_json::json;
    use std::time::Duration;
    use tidings_core::GraphError;

    mock! {
        pub Bus {}
        impl Notifier for Bus {
            fn subscribe(&self, topic: &str, callback: NotificationCallback);
            fn unsubscribe(&self, topic: &str, callback: &NotificationCallback);
            fn notify(&self, topic: &str, data: Value);
        }
    }

    /// Declares a fixed set of topics on every run and echoes the root.
    struct ScriptedExecutor {
        topics: Vec<&'static str>,
        dry_run_errors: bool,
        fatal_after: Option<usize>,
        calls: parking_lot::Mutex<usize>,
    }

    impl ScriptedExecutor {
        fn new(topics: Vec<&'static str>) -> Self {
            Self {
                topics,
                dry_run_errors: false,
                fatal_after: None,
                calls: parking_lot::Mutex::new(0),
            }
        }
    }

    impl Executor for ScriptedExecutor {
        fn execute(&self, _request: &SubscriptionRequest, ctx: &ExecutionContext<'_>) -> ExecutionResult {
            let call = {
                let mut calls = self.calls.lock();
                *calls += 1;
                *calls
            };
            for topic in &self.topics {
                ctx.topics.subscribe(topic);
            }
            match ctx.root {
                None if self.dry_run_errors => ExecutionResult::failed("unknown field"),
                None => ExecutionResult::ok(Value::Null),
                Some(_) if self.fatal_after.is_some_and(|n| call > n) => {
                    ExecutionResult::failed("boom")
                }
                Some(root) => ExecutionResult {
                    data: Some(json!({ "echo": root })),
                    errors: if root.get("partial").is_some() {
                        vec![GraphError::new("partial failure")]
                    } else {
                        Vec::new()
                    },
                },
            }
        }
    }

    type Slot = Arc<parking_lot::Mutex<Option<NotificationCallback>>>;

    /// Bus that records the subscribed callback and expects exactly one
    /// subscribe/unsubscribe pair for `topic`.
    fn capturing_bus(topic: &'static str) -> (MockBus, Slot) {
        let slot: Slot = Arc::default();
        let mut bus = MockBus::new();
        let stored = slot.clone();
        let _ = bus
            .expect_subscribe()
            .with(eq(topic), always())
            .times(1)
            .returning(move |_, cb| *stored.lock() = Some(cb));
        let expected = slot.clone();
        let _ = bus
            .expect_unsubscribe()
            .withf(move |t, cb| {
                t == topic && expected.lock().as_ref().is_some_and(|stored| stored == cb)
            })
            .times(1)
            .return_const(());
        (bus, slot)
    }

    struct Harness {
        events: mpsc::Sender<ProtocolMessage>,
        client: MemoryClient,
        task: tokio::task::JoinHandle<SessionOutcome>,
    }

    fn start_session(
        executor: ScriptedExecutor,
        bus: MockBus,
        config: SubscriptionConfig,
    ) -> Harness {
        let (_source, mut sink, client) = memory::pair(16);
        let (events, rx) = mpsc::channel(16);
        let info = Arc::new(ConnectionInfo::new(ConnectionId::from_raw("conn_test"), None));
        let session = Session::new(info, Arc::new(executor), Arc::new(bus), Arc::new(config));
        let task = tokio::spawn(async move { session.run(rx, &mut sink).await });
        Harness { events, client, task }
    }

    fn start_message() -> ProtocolMessage {
        ProtocolMessage::start("1", SubscriptionRequest::new("subscription { serverTime }"))
    }

    async fn fire(slot: &Slot, data: Value) {
        loop {
            let cb = slot.lock().clone();
            if let Some(cb) = cb {
                cb.invoke(data);
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    // ── streaming ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_notify_stop_sends_one_data_then_unsubscribes() {
        let (bus, slot) = capturing_bus("serverTime");
        let mut h = start_session(
            ScriptedExecutor::new(vec!["serverTime"]),
            bus,
            SubscriptionConfig::default(),
        );

        h.events.send(start_message()).await.unwrap();
        fire(&slot, json!({"x": 1})).await;

        let data = h.client.recv().await.unwrap();
        assert_eq!(data.id, "1");
        assert_eq!(
            data.payload,
            Payload::Data(ExecutionResult::ok(json!({"echo": {"x": 1}})))
        );

        h.events.send(ProtocolMessage::stop("1")).await.unwrap();
        let outcome = h.task.await.unwrap();
        assert_eq!(outcome.reason, EndReason::Stopped);
        assert_eq!(outcome.data_sent, 1);
        assert_eq!(outcome.topics, vec!["serverTime".to_owned()]);
        assert!(h.client.recv_text().await.is_none());
    }

    #[tokio::test]
    async fn disconnect_after_start_cleans_up() {
        let (bus, slot) = capturing_bus("serverTime");
        let mut h = start_session(
            ScriptedExecutor::new(vec!["serverTime"]),
            bus,
            SubscriptionConfig::default(),
        );

        h.events.send(start_message()).await.unwrap();
        while slot.lock().is_none() {
            tokio::task::yield_now().await;
        }
        h.events.send(ProtocolMessage::disconnected()).await.unwrap();

        let outcome = h.task.await.unwrap();
        assert_eq!(outcome.reason, EndReason::Disconnected);
        assert_eq!(outcome.data_sent, 0);
        assert!(h.client.recv_text().await.is_none());
    }

    #[tokio::test]
    async fn reader_gone_counts_as_disconnect() {
        let (bus, _slot) = capturing_bus("serverTime");
        let h = start_session(
            ScriptedExecutor::new(vec!["serverTime"]),
            bus,
            SubscriptionConfig::default(),
        );
        h.events.send(start_message()).await.unwrap();
        drop(h.events);
        assert_eq!(h.task.await.unwrap().reason, EndReason::Disconnected);
    }

    #[tokio::test]
    async fn repeated_interest_subscribes_once() {
        let (bus, slot) = capturing_bus("serverTime");
        let mut h = start_session(
            ScriptedExecutor::new(vec!["serverTime", "serverTime"]),
            bus,
            SubscriptionConfig::default(),
        );

        h.events.send(start_message()).await.unwrap();
        for i in 0..3 {
            fire(&slot, json!({"n": i})).await;
            assert!(h.client.recv().await.is_some());
        }
        h.events.send(ProtocolMessage::stop("1")).await.unwrap();

        let outcome = h.task.await.unwrap();
        assert_eq!(outcome.data_sent, 3);
        assert_eq!(outcome.topics.len(), 1);
    }

    #[tokio::test]
    async fn multiple_topics_each_unsubscribed() {
        let slot: Slot = Arc::default();
        let mut bus = MockBus::new();
        let stored = slot.clone();
        let _ = bus
            .expect_subscribe()
            .times(2)
            .returning(move |_, cb| *stored.lock() = Some(cb));
        let _ = bus
            .expect_unsubscribe()
            .with(eq("a"), always())
            .times(1)
            .return_const(());
        let _ = bus
            .expect_unsubscribe()
            .with(eq("b"), always())
            .times(1)
            .return_const(());

        let h = start_session(
            ScriptedExecutor::new(vec!["b", "a"]),
            bus,
            SubscriptionConfig::default(),
        );
        h.events.send(start_message()).await.unwrap();
        h.events.send(ProtocolMessage::stop("1")).await.unwrap();

        let outcome = h.task.await.unwrap();
        assert_eq!(outcome.topics, vec!["a".to_owned(), "b".to_owned()]);
    }

    // ── awaiting start ────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn start_timeout_is_silent() {
        let bus = MockBus::new();
        let mut h = start_session(
            ScriptedExecutor::new(vec!["serverTime"]),
            bus,
            SubscriptionConfig::default(),
        );

        let outcome = h.task.await.unwrap();
        assert_eq!(outcome.reason, EndReason::StartTimeout);
        assert!(outcome.topics.is_empty());
        assert!(h.client.recv_text().await.is_none());
        drop(h.events);
    }

    #[tokio::test(start_paused = true)]
    async fn start_just_before_timeout_is_accepted() {
        let (bus, _slot) = capturing_bus("serverTime");
        let h = start_session(
            ScriptedExecutor::new(vec!["serverTime"]),
            bus,
            SubscriptionConfig::default(),
        );

        tokio::time::sleep(Duration::from_millis(1900)).await;
        h.events.send(start_message()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        h.events.send(ProtocolMessage::stop("1")).await.unwrap();

        assert_eq!(h.task.await.unwrap().reason, EndReason::Stopped);
    }

    #[tokio::test]
    async fn non_start_first_message_closes_silently() {
        let mut h = start_session(
            ScriptedExecutor::new(vec!["serverTime"]),
            MockBus::new(),
            SubscriptionConfig::default(),
        );
        h.events.send(ProtocolMessage::stop("1")).await.unwrap();

        let outcome = h.task.await.unwrap();
        assert_eq!(outcome.reason, EndReason::InvalidStart);
        assert!(h.client.recv_text().await.is_none());
    }

    #[tokio::test]
    async fn decode_error_first_closes() {
        let h = start_session(
            ScriptedExecutor::new(vec!["serverTime"]),
            MockBus::new(),
            SubscriptionConfig::default(),
        );
        h.events.send(ProtocolMessage::error("", "bad json")).await.unwrap();
        assert_eq!(h.task.await.unwrap().reason, EndReason::InvalidStart);
    }

    // ── validation ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn strict_validation_sends_error_and_cleans_up() {
        let (bus, _slot) = capturing_bus("serverTime");
        let mut executor = ScriptedExecutor::new(vec!["serverTime"]);
        executor.dry_run_errors = true;
        let mut h = start_session(executor, bus, SubscriptionConfig::default());

        h.events.send(start_message()).await.unwrap();
        let msg = h.client.recv().await.unwrap();
        assert_eq!(msg, ProtocolMessage::error("1", "unknown field"));

        let outcome = h.task.await.unwrap();
        assert_eq!(outcome.reason, EndReason::ValidationFailed);
        assert!(h.client.recv_text().await.is_none());
    }

    #[tokio::test]
    async fn lenient_validation_keeps_streaming() {
        let (bus, slot) = capturing_bus("serverTime");
        let mut executor = ScriptedExecutor::new(vec!["serverTime"]);
        executor.dry_run_errors = true;
        let config = SubscriptionConfig {
            validation: ValidationPolicy::Lenient,
            ..SubscriptionConfig::default()
        };
        let mut h = start_session(executor, bus, config);

        h.events.send(start_message()).await.unwrap();
        fire(&slot, json!({"x": 1})).await;
        assert_eq!(h.client.recv().await.unwrap().message_type(), tidings_core::MessageType::Data);
        h.events.send(ProtocolMessage::stop("1")).await.unwrap();
        assert_eq!(h.task.await.unwrap().reason, EndReason::Stopped);
    }

    #[tokio::test]
    async fn field_errors_are_not_fatal() {
        let (bus, slot) = capturing_bus("serverTime");
        let mut h = start_session(
            ScriptedExecutor::new(vec!["serverTime"]),
            bus,
            SubscriptionConfig::default(),
        );
        h.events.send(start_message()).await.unwrap();

        fire(&slot, json!({"partial": true})).await;
        let Payload::Data(result) = h.client.recv().await.unwrap().payload else {
            panic!("expected data");
        };
        assert_eq!(result.errors.len(), 1);
        assert!(result.data.is_some());

        fire(&slot, json!({"x": 2})).await;
        assert!(h.client.recv().await.is_some());
        h.events.send(ProtocolMessage::stop("1")).await.unwrap();
        assert_eq!(h.task.await.unwrap().data_sent, 2);
    }

    #[tokio::test]
    async fn fatal_result_delivered_then_session_ends() {
        let (bus, slot) = capturing_bus("serverTime");
        let mut executor = ScriptedExecutor::new(vec!["serverTime"]);
        executor.fatal_after = Some(1);
        let mut h = start_session(executor, bus, SubscriptionConfig::default());
        h.events.send(start_message()).await.unwrap();

        fire(&slot, json!({"x": 1})).await;
        let Payload::Data(result) = h.client.recv().await.unwrap().payload else {
            panic!("expected data");
        };
        assert!(result.is_fatal());

        let outcome = h.task.await.unwrap();
        assert_eq!(outcome.reason, EndReason::FatalResult);
        assert_eq!(outcome.data_sent, 1);
    }

    // ── failures ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn send_failure_ends_session_with_cleanup() {
        let (bus, slot) = capturing_bus("serverTime");
        let mut h = start_session(
            ScriptedExecutor::new(vec!["serverTime"]),
            bus,
            SubscriptionConfig::default(),
        );
        h.events.send(start_message()).await.unwrap();
        h.client.stop_reading();
        fire(&slot, json!({"x": 1})).await;

        let outcome = h.task.await.unwrap();
        assert_eq!(outcome.reason, EndReason::SendFailed);
        assert_eq!(outcome.data_sent, 0);
    }

    #[tokio::test]
    async fn bad_client_message_while_streaming_is_ignored() {
        let (bus, slot) = capturing_bus("serverTime");
        let mut h = start_session(
            ScriptedExecutor::new(vec!["serverTime"]),
            bus,
            SubscriptionConfig::default(),
        );
        h.events.send(start_message()).await.unwrap();
        h.events.send(ProtocolMessage::error("", "bad json")).await.unwrap();
        h.events.send(start_message()).await.unwrap();

        fire(&slot, json!({"x": 1})).await;
        assert!(h.client.recv().await.is_some());
        h.events.send(ProtocolMessage::stop("1")).await.unwrap();
        assert_eq!(h.task.await.unwrap().reason, EndReason::Stopped);
    }

    #[tokio::test]
    async fn full_buffer_drops_notifications() {
        let (bus, slot) = capturing_bus("serverTime");
        let config = SubscriptionConfig {
            notification_buffer: 1,
            ..SubscriptionConfig::default()
        };
        let (_source, sink, mut client) = memory::pair(16);
        let info = Arc::new(ConnectionInfo::new(ConnectionId::from_raw("conn_test"), None));
        let session = Session::new(
            info,
            Arc::new(ScriptedExecutor::new(vec!["serverTime"])),
            Arc::new(bus),
            Arc::new(config),
        );
        let callback = session.callback().clone();
        callback.invoke(json!(1));
        callback.invoke(json!(2));

        let (events, rx) = mpsc::channel(4);
        let task = tokio::spawn(async move {
            let mut sink = sink;
            session.run(rx, &mut sink).await
        });
        events.send(start_message()).await.unwrap();

        let Payload::Data(result) = client.recv().await.unwrap().payload else {
            panic!("expected data");
        };
        assert_eq!(result.data, Some(json!({"echo": 1})));

        // wait until the bus has the callback so unsubscribe expectations hold
        while slot.lock().is_none() {
            tokio::task::yield_now().await;
        }
        events.send(ProtocolMessage::stop("1")).await.unwrap();
        assert_eq!(task.await.unwrap().data_sent, 1);
    }

    // ── shutdown ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn shutdown_token_ends_streaming() {
        let (bus, slot) = capturing_bus("serverTime");
        let token = CancellationToken::new();
        let (_source, sink, _client) = memory::pair(16);
        let info = Arc::new(ConnectionInfo::new(ConnectionId::from_raw("conn_test"), None));
        let session = Session::new(
            info.clone(),
            Arc::new(ScriptedExecutor::new(vec!["serverTime"])),
            Arc::new(bus),
            Arc::new(SubscriptionConfig::default()),
        )
        .with_shutdown(token.clone());

        let (events, rx) = mpsc::channel(4);
        let task = tokio::spawn(async move {
            let mut sink = sink;
            session.run(rx, &mut sink).await
        });
        events.send(start_message()).await.unwrap();
        while slot.lock().is_none() {
            tokio::task::yield_now().await;
        }
        assert_eq!(info.state(), SessionState::Streaming);

        token.cancel();
        assert_eq!(task.await.unwrap().reason, EndReason::Shutdown);
        assert_eq!(info.state(), SessionState::Closed);
        assert!(!info.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_awaiting_start_ends_promptly() {
        let token = CancellationToken::new();
        let (_source, mut sink, mut client) = memory::pair(16);
        let info = Arc::new(ConnectionInfo::new(ConnectionId::from_raw("conn_idle"), None));
        let config = SubscriptionConfig {
            start_timeout: Duration::from_secs(600),
            ..SubscriptionConfig::default()
        };
        let session = Session::new(
            info,
            Arc::new(ScriptedExecutor::new(vec!["serverTime"])),
            Arc::new(MockBus::new()),
            Arc::new(config),
        )
        .with_shutdown(token.clone());
        assert_eq!(session.connection_id().as_str(), "conn_idle");

        let (_events, rx) = mpsc::channel(4);
        let task = tokio::spawn(async move { session.run(rx, &mut sink).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();

        let started = tokio::time::Instant::now();
        let outcome = task.await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(outcome.reason, EndReason::Shutdown);
        assert!(outcome.topics.is_empty());
        assert!(client.recv_text().await.is_none());
    }
}
