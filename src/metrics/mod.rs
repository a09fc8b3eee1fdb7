//! Per-server request metrics: counts and latency aggregates.
//!
//! Each [`Host`](crate::host::Host) owns one [`Metrics`] instance -- there is
//! no process-global registry, so multiple hosts in one process never share
//! counters. Latencies are tracked as a bounded ring of the most recent 1000
//! observations per server, from which p95 is computed on demand.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const RECENT_WINDOW: usize = 1000;

struct ServerMetricsInner {
    request_count: AtomicU64,
    success_count: AtomicU64,
    error_count: AtomicU64,
    total_latency_micros: AtomicU64,
    min_latency_micros: AtomicU64,
    max_latency_micros: AtomicU64,
    recent_micros: Mutex<VecDeque<u64>>,
}

impl Default for ServerMetricsInner {
    fn default() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            total_latency_micros: AtomicU64::new(0),
            min_latency_micros: AtomicU64::new(u64::MAX),
            max_latency_micros: AtomicU64::new(0),
            recent_micros: Mutex::new(VecDeque::with_capacity(RECENT_WINDOW)),
        }
    }
}

impl ServerMetricsInner {
    fn record(&self, latency: Duration, success: bool) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_micros.fetch_add(micros, Ordering::Relaxed);
        self.min_latency_micros.fetch_min(micros, Ordering::Relaxed);
        self.max_latency_micros.fetch_max(micros, Ordering::Relaxed);

        let mut recent = self.recent_micros.lock();
        if recent.len() >= RECENT_WINDOW {
            recent.pop_front();
        }
        recent.push_back(micros);
    }

    fn snapshot(&self, server: &str) -> ServerMetricsSnapshot {
        let request_count = self.request_count.load(Ordering::Relaxed);
        let success_count = self.success_count.load(Ordering::Relaxed);
        let error_count = self.error_count.load(Ordering::Relaxed);
        let total_micros = self.total_latency_micros.load(Ordering::Relaxed);
        let min_micros = self.min_latency_micros.load(Ordering::Relaxed);
        let max_micros = self.max_latency_micros.load(Ordering::Relaxed);

        let avg_latency_ms = if request_count > 0 {
            (total_micros as f64 / request_count as f64) / 1000.0
        } else {
            0.0
        };
        let min_latency_ms = if request_count > 0 { min_micros as f64 / 1000.0 } else { 0.0 };
        let max_latency_ms = max_micros as f64 / 1000.0;

        let p95_latency_ms = {
            let recent = self.recent_micros.lock();
            if recent.is_empty() {
                0.0
            } else {
                let mut sorted: Vec<u64> = recent.iter().copied().collect();
                sorted.sort_unstable();
                let index = ((sorted.len() as f64) * 0.95).ceil() as usize;
                let index = index.saturating_sub(1).min(sorted.len() - 1);
                sorted[index] as f64 / 1000.0
            }
        };

        ServerMetricsSnapshot {
            server: server.to_string(),
            request_count,
            success_count,
            error_count,
            avg_latency_ms,
            min_latency_ms,
            max_latency_ms,
            p95_latency_ms,
        }
    }
}

/// A point-in-time view of one server's request metrics.
#[derive(Debug, Clone, Serialize)]
pub struct ServerMetricsSnapshot {
    pub server: String,
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p95_latency_ms: f64,
}

/// Per-server metrics collector.
#[derive(Default)]
pub struct Metrics {
    servers: DashMap<String, Arc<ServerMetricsInner>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of one router attempt against `server`.
    pub fn record(&self, server: &str, method: &str, latency: Duration, success: bool) {
        let inner = self.servers.entry(server.to_string()).or_default().clone();
        inner.record(latency, success);
        tracing::debug!(server, method, ?latency, success, "recorded request metrics");
    }

    pub fn snapshot(&self, server: &str) -> Option<ServerMetricsSnapshot> {
        self.servers.get(server).map(|inner| inner.snapshot(server))
    }

    pub fn all_snapshots(&self) -> Vec<ServerMetricsSnapshot> {
        self.servers.iter().map(|entry| entry.value().snapshot(entry.key())).collect()
    }
}
