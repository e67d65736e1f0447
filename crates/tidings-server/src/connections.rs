//! Live connection tracking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tidings_core::ConnectionId;
use tracing::trace;

use crate::session::SessionState;

/// State of one accepted connection, shared between its session and observers.
#[derive(Debug)]
pub struct ConnectionInfo {
    id: ConnectionId,
    origin: Option<String>,
    connected_at: Instant,
    state: Mutex<SessionState>,
    alive: AtomicBool,
}

impl ConnectionInfo {
    /// Create info for a fresh connection in `AwaitingStart`.
    pub fn new(id: ConnectionId, origin: Option<String>) -> Self {
        Self {
            id,
            origin,
            connected_at: Instant::now(),
            state: Mutex::new(SessionState::AwaitingStart),
            alive: AtomicBool::new(true),
        }
    }

    /// Connection identifier.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// `Origin` header sent with the upgrade request, if any.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Move the session to `next`.
    pub fn set_state(&self, next: SessionState) {
        let prev = std::mem::replace(&mut *self.state.lock(), next);
        if next == SessionState::Closed {
            self.alive.store(false, Ordering::Relaxed);
        }
        trace!(connection_id = %self.id, from = %prev, to = %next, "session state");
    }

    /// Whether the session has not reached `Closed`.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Time since the connection was accepted.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Registry of accepted connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionInfo>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new connection under a fresh id.
    pub fn register(&self, origin: Option<String>) -> Arc<ConnectionInfo> {
        let info = Arc::new(ConnectionInfo::new(ConnectionId::new(), origin));
        let _ = self.connections.insert(info.id().clone(), info.clone());
        info
    }

    /// Stop tracking a connection.
    pub fn unregister(&self, id: &ConnectionId) {
        let _ = self.connections.remove(id);
    }

    /// Look up a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ConnectionInfo>> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    /// Number of tracked connections.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Number of tracked connections currently in `state`.
    pub fn count_in(&self, state: SessionState) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().state() == state)
            .count()
    }

    /// Ids and states of every tracked connection.
    pub fn snapshot(&self) -> Vec<(ConnectionId, SessionState)> {
        self.connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect()
    }
}
