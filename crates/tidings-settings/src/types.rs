//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial
//! JSON is accepted and missing fields keep their default value.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "subscriptions": { "startTimeoutMs": 5000, "origins": { "mode": "sameHost" } }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TidingsSettings {
    /// HTTP listener.
    pub server: ServerSettings,
    /// Subscription session behaviour.
    pub subscriptions: SubscriptionSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl TidingsSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.server.path.starts_with('/') {
            return Err(SettingsError::invalid(
                "server.path",
                format!("must start with '/', got {:?}", self.server.path),
            ));
        }
        if self.server.max_message_size == 0 {
            return Err(SettingsError::invalid("server.maxMessageSize", "must be positive"));
        }
        let subs = &self.subscriptions;
        if subs.start_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "subscriptions.startTimeoutMs",
                "must be positive",
            ));
        }
        if subs.notification_buffer == 0 {
            return Err(SettingsError::invalid(
                "subscriptions.notificationBuffer",
                "must hold at least one message",
            ));
        }
        if subs.event_buffer == 0 {
            return Err(SettingsError::invalid(
                "subscriptions.eventBuffer",
                "must hold at least one message",
            ));
        }
        if subs.origins.mode == OriginMode::AllowList && subs.origins.allowed.is_empty() {
            return Err(SettingsError::invalid(
                "subscriptions.origins.allowed",
                "is empty in allowList mode",
            ));
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Route serving the WebSocket upgrade.
    pub path: String,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            path: "/subscriptions".into(),
            max_message_size: 1024 * 1024,
        }
    }
}

/// Per-connection subscription settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionSettings {
    /// How long a new connection may stay silent before it is abandoned.
    pub start_timeout_ms: u64,
    /// Pending notification payloads per session before new ones are dropped.
    pub notification_buffer: usize,
    /// Pending client messages between the reader and the session loop.
    pub event_buffer: usize,
    /// What to do when the initial dry run reports errors.
    pub validation: ValidationMode,
    /// Which browser origins may connect.
    pub origins: OriginSettings,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            start_timeout_ms: 2000,
            notification_buffer: 64,
            event_buffer: 16,
            validation: ValidationMode::Strict,
            origins: OriginSettings::default(),
        }
    }
}

/// Dry-run error handling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationMode {
    /// Report the errors to the client and close the session.
    #[default]
    Strict,
    /// Ignore the errors and start streaming.
    Lenient,
}

/// Origin acceptance settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OriginSettings {
    /// Acceptance rule.
    pub mode: OriginMode,
    /// Accepted origins for [`OriginMode::AllowList`], e.g. `https://app.example.com`.
    pub allowed: Vec<String>,
}

/// Origin acceptance rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OriginMode {
    /// Accept every connection.
    #[default]
    Any,
    /// Accept when the `Origin` host matches the `Host` header (or no `Origin` is sent).
    SameHost,
    /// Accept only origins listed in `allowed`.
    AllowList,
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter (`RUST_LOG` takes precedence).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}
