//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Accepted WebSocket connections.
    pub connections: usize,
    /// Sessions currently streaming.
    pub streaming: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, streaming: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        streaming,
    }
}
