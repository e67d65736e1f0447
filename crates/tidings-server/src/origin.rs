//! Upgrade-time origin checks.

use std::fmt;
use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::{HOST, ORIGIN};
use tidings_settings::{OriginMode, OriginSettings};

type OriginPredicate = dyn Fn(&HeaderMap) -> bool + Send + Sync;

/// Decides whether a WebSocket upgrade request may proceed.
#[derive(Clone, Default)]
pub enum OriginCheck {
    /// Accept every request.
    #[default]
    Any,
    /// Accept when the `Origin` authority equals the `Host` header, or when no
    /// `Origin` is sent (non-browser clients).
    SameHost,
    /// Accept only the listed origins. Requests without `Origin` are rejected.
    AllowList(Arc<[String]>),
    /// Arbitrary predicate over the request headers.
    Custom(Arc<OriginPredicate>),
}

impl OriginCheck {
    /// Allow-list check. Entries are compared case-insensitively, ignoring a
    /// trailing `/`.
    pub fn allow_list<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let origins: Vec<String> = origins
            .into_iter()
            .map(|o| o.into().trim_end_matches('/').to_ascii_lowercase())
            .collect();
        Self::AllowList(origins.into())
    }

    /// Predicate check.
    pub fn custom(predicate: impl Fn(&HeaderMap) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    /// Build from loaded settings.
    pub fn from_settings(settings: &OriginSettings) -> Self {
        match settings.mode {
            OriginMode::Any => Self::Any,
            OriginMode::SameHost => Self::SameHost,
            OriginMode::AllowList => Self::allow_list(settings.allowed.iter().cloned()),
        }
    }

    /// Whether a request with `headers` is accepted.
    pub fn accepts(&self, headers: &HeaderMap) -> bool {
        let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
        match self {
            Self::Any => true,
            Self::SameHost => {
                let Some(origin) = origin else {
                    return true;
                };
                let host = headers.get(HOST).and_then(|v| v.to_str().ok());
                match (origin_authority(origin), host) {
                    (Some(authority), Some(host)) => authority.eq_ignore_ascii_case(host),
                    _ => false,
                }
            }
            Self::AllowList(allowed) => origin.is_some_and(|origin| {
                let origin = origin.trim_end_matches('/');
                allowed.iter().any(|a| a.eq_ignore_ascii_case(origin))
            }),
            Self::Custom(predicate) => predicate(headers),
        }
    }
}

impl fmt::Debug for OriginCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::SameHost => f.write_str("SameHost"),
            Self::AllowList(allowed) => f.debug_tuple("AllowList").field(allowed).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// `host[:port]` part of an origin such as `https://app.example:8443`.
fn origin_authority(origin: &str) -> Option<&str> {
    let (_, rest) = origin.split_once("://")?;
    let authority = rest.split('/').next().unwrap_or(rest);
    (!authority.is_empty()).then_some(authority)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
