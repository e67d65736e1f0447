//! Query-execution port.
//!
//! The engine that actually parses and resolves queries lives outside this
//! workspace. Sessions only need a synchronous call that takes a
//! [`SubscriptionRequest`] plus an [`ExecutionContext`] and returns an
//! [`ExecutionResult`]. Resolvers declare interest in topics through the
//! context's [`TopicSink`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ConnectionId;
use crate::protocol::SubscriptionRequest;

/// Receives topic-interest declarations made while a query executes.
///
/// Implementations must tolerate calls from any thread and repeated calls
/// for the same topic.
pub trait TopicSink: Send + Sync {
    /// Declare that the running subscription depends on `topic`.
    fn subscribe(&self, topic: &str);
}

/// Everything a resolver may need besides the request itself.
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    /// Connection the query runs for.
    pub connection_id: &'a ConnectionId,
    /// Where resolvers register the topics they depend on.
    pub topics: &'a dyn TopicSink,
    /// Notification payload that triggered this run; `None` on the dry run.
    pub root: Option<&'a Value>,
}

impl<'a> ExecutionContext<'a> {
    /// Context for the initial validation run (no root input).
    pub fn dry_run(connection_id: &'a ConnectionId, topics: &'a dyn TopicSink) -> Self {
        Self {
            connection_id,
            topics,
            root: None,
        }
    }

    /// Context for a re-execution triggered by a notification.
    pub fn triggered(
        connection_id: &'a ConnectionId,
        topics: &'a dyn TopicSink,
        root: &'a Value,
    ) -> Self {
        Self {
            connection_id,
            topics,
            root: Some(root),
        }
    }
}

/// Executes subscription queries.
pub trait Executor: Send + Sync {
    /// Run `request` once. Must not block for long: it runs on the session task.
    fn execute(&self, request: &SubscriptionRequest, ctx: &ExecutionContext<'_>) -> ExecutionResult;
}

/// A single error reported by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphError {
    /// Human-readable description.
    pub message: String,
    /// Response path of the failing field, if field-level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
}

impl GraphError {
    /// Request-level error without a path.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    /// Field-level error at `path`.
    pub fn at(message: impl Into<String>, path: Vec<Value>) -> Self {
        Self {
            message: message.into(),
            path: Some(path),
        }
    }
}

/// Outcome of one execution: `{ "data": ..., "errors": [...] }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Resolved data; `null` when the request failed as a whole.
    #[serde(default)]
    pub data: Option<Value>,
    /// Errors collected during execution (omitted when empty).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphError>,
}

impl ExecutionResult {
    /// Successful result carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Request-level failure: no data, one error.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            data: None,
            errors: vec![GraphError::new(message)],
        }
    }

    /// Whether any error was reported.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Whether the request failed outright: errors and no data at all.
    ///
    /// Field-level errors alongside partial data are not fatal.
    pub fn is_fatal(&self) -> bool {
        self.data.is_none() && self.has_errors()
    }

    /// All error messages joined with `"; "`.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
