//! Per-session set of topics already subscribed on the notifier.

use std::collections::BTreeSet;

use parking_lot::Mutex;

/// Topics a session has subscribed to.
///
/// Resolvers may declare interest from any thread, so the check-and-insert in
/// [`mark_subscribed`](Self::mark_subscribed) happens under one lock.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: Mutex<BTreeSet<String>>,
}

impl TopicRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `topic`. Returns `true` only the first time, meaning the caller
    /// must now subscribe on the notifier.
    pub fn mark_subscribed(&self, topic: &str) -> bool {
        let mut topics = self.topics.lock();
        if topics.contains(topic) {
            return false;
        }
        topics.insert(topic.to_owned())
    }

    /// Snapshot of the recorded topics.
    pub fn all_topics(&self) -> BTreeSet<String> {
        self.topics.lock().clone()
    }

    /// Remove and return every recorded topic.
    pub fn take_all(&self) -> BTreeSet<String> {
        std::mem::take(&mut *self.topics.lock())
    }

    /// Number of recorded topics.
    pub fn len(&self) -> usize {
        self.topics.lock().len()
    }

    /// Whether no topic has been recorded.
    pub fn is_empty(&self) -> bool {
        self.topics.lock().is_empty()
    }
}
