//! # tidings-core
//!
//! Shared building blocks for subscription sessions:
//!
//! - [`protocol`]: the `graphql-ws` message envelope and its two-phase codec
//! - [`execution`]: the query-execution port and its explicit context
//! - [`notifier`]: the publish/subscribe port and identity-comparable callbacks
//! - [`ids`]: branded identifiers
//! - [`errors`]: codec and transport error types

#![deny(unsafe_code)]

pub mod errors;
pub mod execution;
pub mod ids;
pub mod notifier;
pub mod protocol;

pub use errors::{DecodeError, EncodeError, TransportError};
pub use execution::{ExecutionContext, ExecutionResult, Executor, GraphError, TopicSink};
pub use ids::ConnectionId;
pub use notifier::{NotificationCallback, Notifier};
pub use protocol::{MessageType, Payload, ProtocolMessage, SubscriptionRequest};
