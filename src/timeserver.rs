//! The `serverTime` demo: an executor that answers with the time carried by
//! the triggering notification, and a ticker that publishes it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};
use tidings_core::{ExecutionContext, ExecutionResult, Executor, Notifier, SubscriptionRequest};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Topic the ticker publishes on.
pub const TOPIC: &str = "serverTime";

/// Resolves `subscription { serverTime }`.
pub struct ServerTimeExecutor;

impl Executor for ServerTimeExecutor {
    fn execute(&self, request: &SubscriptionRequest, ctx: &ExecutionContext<'_>) -> ExecutionResult {
        if !request.query.contains(TOPIC) {
            return ExecutionResult::failed(format!("query must select `{TOPIC}`"));
        }
        ctx.topics.subscribe(TOPIC);

        let time = ctx
            .root
            .and_then(|root| root.get("time"))
            .and_then(Value::as_str)
            .map_or_else(|| rfc3339(Utc::now()), str::to_owned);
        ExecutionResult::ok(json!({ "serverTime": time }))
    }
}

/// Notification payload for one tick.
pub fn tick_payload(now: DateTime<Utc>) -> Value {
    json!({ "time": rfc3339(now) })
}

/// Publish [`tick_payload`] on [`TOPIC`] every `every` until `shutdown` fires.
pub fn spawn_ticker(
    notifier: Arc<dyn Notifier>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => notifier.notify(TOPIC, tick_payload(Utc::now())),
            }
        }
        debug!("ticker stopped");
    })
}

fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}
