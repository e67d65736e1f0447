//! # tidings-server
//!
//! `graphql-ws` subscription sessions bridged to a publish/subscribe notifier.
//!
//! - Transport port with Axum `WebSocket` and in-memory adapters
//! - Reader task turning frames into session events
//! - Session state machine: start, dry run, streaming, cleanup
//! - Axum server with origin checks, `/health`, `/metrics` and graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod connections;
pub mod handler;
pub mod health;
pub mod origin;
pub mod reader;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod topics;
pub mod transport;

pub use config::{ServerConfig, SubscriptionConfig, ValidationPolicy};
pub use connections::{ConnectionInfo, ConnectionRegistry};
pub use handler::SubscriptionHandler;
pub use origin::OriginCheck;
pub use server::SubscriptionServer;
pub use session::{EndReason, Session, SessionOutcome, SessionState};
pub use shutdown::ShutdownCoordinator;
pub use topics::TopicRegistry;
