//! Structured-logging helpers: per-connection/per-RPC latency tracking and
//! the `/healthz` status body. Modeled on the teacher's own
//! `observability.rs`.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

/// Tracks how long a connection or RPC call stayed open and logs it on
/// drop-equivalent `finish()`.
pub struct LatencyTracker {
    operation: String,
    start: Instant,
}

impl LatencyTracker {
    pub fn start(operation: impl Into<String>) -> Self {
        Self { operation: operation.into(), start: Instant::now() }
    }

    /// Logs the elapsed time; connections held open for more than ten
    /// minutes are surfaced at `info` rather than `debug` since a stream
    /// that long-lived is usually worth a second look.
    pub fn finish(self) {
        let elapsed_ms = self.start.elapsed().as_millis();
        if elapsed_ms > 600_000 {
            info!(operation = %self.operation, elapsed_ms, "long-lived stream closed");
        } else {
            debug!(operation = %self.operation, elapsed_ms, "stream closed");
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub active_connections: usize,
}

impl HealthStatus {
    pub fn ok(uptime_secs: u64, active_connections: usize) -> Self {
        Self { status: "ok", version: env!("CARGO_PKG_VERSION"), uptime_secs, active_connections }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_reports_given_fields() {
        let h = HealthStatus::ok(42, 3);
        assert_eq!(h.status, "ok");
        assert_eq!(h.uptime_secs, 42);
        assert_eq!(h.active_connections, 3);
    }
}
