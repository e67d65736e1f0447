//! In-process topic bus.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;
use tidings_core::notifier::{NotificationCallback, Notifier};
use tracing::{debug, trace};

/// Topic → callbacks map living in this process.
///
/// `notify` snapshots the callback list and invokes it after releasing the
/// lock, so callbacks may subscribe or unsubscribe without deadlocking.
#[derive(Default)]
pub struct LocalNotifier {
    topics: RwLock<HashMap<String, Vec<NotificationCallback>>>,
}

impl LocalNotifier {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of callbacks registered for `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, Vec::len)
    }

    /// Topics with at least one callback, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Notifier for LocalNotifier {
    fn subscribe(&self, topic: &str, callback: NotificationCallback) {
        debug!(topic, owner = callback.label(), "subscribe");
        self.topics
            .write()
            .entry(topic.to_owned())
            .or_default()
            .push(callback);
    }

    fn unsubscribe(&self, topic: &str, callback: &NotificationCallback) {
        let mut topics = self.topics.write();
        let Some(callbacks) = topics.get_mut(topic) else {
            return;
        };
        if let Some(pos) = callbacks.iter().position(|cb| cb == callback) {
            let _ = callbacks.remove(pos);
            debug!(topic, owner = callback.label(), "unsubscribe");
        }
        if callbacks.is_empty() {
            let _ = topics.remove(topic);
        }
    }

    fn notify(&self, topic: &str, data: Value) {
        let callbacks = match self.topics.read().get(topic) {
            Some(callbacks) => callbacks.clone(),
            None => return,
        };
        trace!(topic, recipients = callbacks.len(), "notify");
        for callback in &callbacks {
            callback.invoke(data.clone());
        }
    }
}
