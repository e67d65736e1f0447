//! Publish/subscribe port.
//!
//! Any bus satisfying [`Notifier`] can back subscription sessions. Callbacks
//! may be invoked from any task or thread, so they must hand payloads off
//! (e.g. through a channel) rather than do work inline.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

type CallbackFn = dyn Fn(Value) + Send + Sync;

/// Identity-comparable handle to a notification callback.
///
/// Clones share identity: the value passed to [`Notifier::subscribe`] (or any
/// clone of it) is the key for [`Notifier::unsubscribe`]. Two handles built
/// from separate [`NotificationCallback::new`] calls never compare equal,
/// even when wrapping the same closure.
#[derive(Clone)]
pub struct NotificationCallback {
    label: Arc<str>,
    inner: Arc<CallbackFn>,
}

impl NotificationCallback {
    /// Wrap `f`; `label` is used for diagnostics only.
    pub fn new(label: impl Into<Arc<str>>, f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            inner: Arc::new(f),
        }
    }

    /// Deliver a payload.
    pub fn invoke(&self, data: Value) {
        (self.inner)(data);
    }

    /// Diagnostic label (usually the owning connection id).
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for NotificationCallback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for NotificationCallback {}

impl fmt::Debug for NotificationCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationCallback")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Topic-based publish/subscribe.
pub trait Notifier: Send + Sync {
    /// Register `callback` for `topic`.
    fn subscribe(&self, topic: &str, callback: NotificationCallback);

    /// Remove a callback previously registered for `topic`. Unknown pairs are ignored.
    fn unsubscribe(&self, topic: &str, callback: &NotificationCallback);

    /// Deliver `data` to every callback registered for `topic`.
    fn notify(&self, topic: &str, data: Value);
}
