//! Server and subscription configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tidings_settings::{ServerSettings, SubscriptionSettings, ValidationMode};

use crate::origin::OriginCheck;

/// HTTP listener configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Route serving the WebSocket upgrade.
    pub path: String,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            path: "/subscriptions".into(),
            max_message_size: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            path: settings.path.clone(),
            max_message_size: settings.max_message_size,
        }
    }
}

/// What a session does when its dry run reports errors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Send one `error` message and close.
    #[default]
    Strict,
    /// Start streaming anyway.
    Lenient,
}

impl From<ValidationMode> for ValidationPolicy {
    fn from(mode: ValidationMode) -> Self {
        match mode {
            ValidationMode::Strict => Self::Strict,
            ValidationMode::Lenient => Self::Lenient,
        }
    }
}

/// Per-connection options.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Accept or reject the upgrade request.
    pub origin_check: OriginCheck,
    /// How long to wait for the first client message.
    pub start_timeout: Duration,
    /// Pending notification payloads per session.
    pub notification_buffer: usize,
    /// Pending client messages between reader and session.
    pub event_buffer: usize,
    /// Dry-run error handling.
    pub validation: ValidationPolicy,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            origin_check: OriginCheck::Any,
            start_timeout: Duration::from_secs(2),
            notification_buffer: 64,
            event_buffer: 16,
            validation: ValidationPolicy::Strict,
        }
    }
}

impl SubscriptionConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &SubscriptionSettings) -> Self {
        Self {
            origin_check: OriginCheck::from_settings(&settings.origins),
            start_timeout: Duration::from_millis(settings.start_timeout_ms),
            notification_buffer: settings.notification_buffer.max(1),
            event_buffer: settings.event_buffer.max(1),
            validation: settings.validation.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
