//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is up.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered chat connections.
    pub connections: usize,
    /// Channels with at least one member.
    pub channels: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, channels: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        channels,
    }
}
