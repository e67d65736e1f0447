//! Settings error types.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Why settings could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file {}: {source}", .path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The settings file is not JSON.
    #[error("settings file {} is not valid JSON: {source}", .path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Parser failure with line and column.
        #[source]
        source: serde_json::Error,
    },
    /// The merged document does not fit the settings schema
    /// (e.g. `"port": "http"`).
    #[error("settings do not match the expected shape: {0}")]
    Schema(#[from] serde_json::Error),
    /// A field holds a value the server cannot run with.
    #[error("invalid `{field}`: {reason}")]
    InvalidValue {
        /// Dotted camelCase path, e.g. `subscriptions.startTimeoutMs`.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Settings file involved, for read and parse failures.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } => Some(path.as_path()),
            Self::Schema(_) | Self::InvalidValue { .. } => None,
        }
    }

    /// Offending field, for validation failures.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidValue { field, .. } => Some(*field),
            _ => None,
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn read_error_names_the_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/tidings.json"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.path(), Some(Path::new("/etc/tidings.json")));
        let msg = err.to_string();
        assert!(msg.contains("/etc/tidings.json"), "got: {msg}");
        assert!(msg.contains("denied"), "got: {msg}");
        assert!(err.source().is_some());
    }

    #[test]
    fn parse_error_names_the_file() {
        let source = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err = SettingsError::Parse {
            path: PathBuf::from("settings.json"),
            source,
        };
        assert!(err.to_string().starts_with("settings file settings.json is not valid JSON"));
        assert_eq!(err.field(), None);
    }

    #[test]
    fn schema_error_has_no_path() {
        let source = serde_json::from_str::<u16>("\"http\"").unwrap_err();
        let err = SettingsError::from(source);
        assert!(err.path().is_none());
        assert!(err.to_string().contains("expected shape"));
    }

    #[test]
    fn invalid_value_carries_field() {
        let err = SettingsError::invalid("subscriptions.startTimeoutMs", "must be positive");
        assert_eq!(err.field(), Some("subscriptions.startTimeoutMs"));
        assert_eq!(
            err.to_string(),
            "invalid `subscriptions.startTimeoutMs`: must be positive"
        );
    }
}
