//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TidingsSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `TIDINGS_*` environment overrides
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{OriginMode, TidingsSettings, ValidationMode};

/// Resolve the default settings file (`~/.tidings/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tidings").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TidingsSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or invalid values are errors.
pub fn load_settings_from_path(path: &Path) -> Result<TidingsSettings> {
    let defaults = serde_json::to_value(TidingsSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_owned(),
            source,
        })?;
        let user: Value =
            serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_owned(),
                source,
            })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TidingsSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `TIDINGS_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut TidingsSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply `TIDINGS_*` overrides using `lookup` to read variables.
///
/// Invalid values are logged and ignored, leaving the file/default value.
pub fn apply_overrides_from(settings: &mut TidingsSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("TIDINGS_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("TIDINGS_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("TIDINGS_PATH") {
        settings.server.path = v;
    }
    if let Some(v) = env.usize("TIDINGS_MAX_MESSAGE_SIZE", 1024, 64 * 1024 * 1024) {
        settings.server.max_message_size = v;
    }

    // ── Subscriptions ───────────────────────────────────────────────
    if let Some(v) = env.u64("TIDINGS_START_TIMEOUT_MS", 100, 600_000) {
        settings.subscriptions.start_timeout_ms = v;
    }
    if let Some(v) = env.usize("TIDINGS_NOTIFICATION_BUFFER", 1, 65_536) {
        settings.subscriptions.notification_buffer = v;
    }
    if let Some(v) = env.usize("TIDINGS_EVENT_BUFFER", 1, 65_536) {
        settings.subscriptions.event_buffer = v;
    }
    if let Some(raw) = env.string("TIDINGS_VALIDATION") {
        match raw.to_ascii_lowercase().as_str() {
            "strict" => settings.subscriptions.validation = ValidationMode::Strict,
            "lenient" => settings.subscriptions.validation = ValidationMode::Lenient,
            _ => warn!(key = "TIDINGS_VALIDATION", value = %raw, "invalid validation mode, ignoring"),
        }
    }
    if let Some(raw) = env.string("TIDINGS_ALLOWED_ORIGINS") {
        let allowed: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        if !allowed.is_empty() {
            settings.subscriptions.origins.mode = OriginMode::AllowList;
            settings.subscriptions.origins.allowed = allowed;
        }
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("TIDINGS_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("TIDINGS_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Parse a boolean env var value.
///
/// Accepts `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off` (case-insensitive).
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.u64(name, u64::from(min), u64::from(max))
            .and_then(|n| u16::try_from(n).ok())
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.u64(name, min as u64, max as u64)
            .and_then(|n| usize::try_from(n).ok())
    }
}
