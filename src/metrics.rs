// SPDX-License-Identifier: Apache-2.0

//! Lightweight in-memory counters for queries and the metadata cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
struct Counters {
    queries_total: AtomicU64,
    queries_failed: AtomicU64,
    queries_cancelled: AtomicU64,
    queries_timed_out: AtomicU64,
    duration_total_ms: AtomicU64,
    duration_max_ms: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

static COUNTERS: OnceLock<Counters> = OnceLock::new();

fn counters() -> &'static Counters {
    COUNTERS.get_or_init(Counters::default)
}

pub fn record_query(duration_ms: u64, success: bool) {
    let counters = counters();
    counters.queries_total.fetch_add(1, Ordering::Relaxed);
    if !success {
        counters.queries_failed.fetch_add(1, Ordering::Relaxed);
    }
    counters
        .duration_total_ms
        .fetch_add(duration_ms, Ordering::Relaxed);
    counters
        .duration_max_ms
        .fetch_max(duration_ms, Ordering::Relaxed);
}

pub fn record_cancel() {
    counters().queries_cancelled.fetch_add(1, Ordering::Relaxed);
}

pub fn record_timeout() {
    counters().queries_timed_out.fetch_add(1, Ordering::Relaxed);
}

pub fn record_cache_lookup(hit: bool) {
    let counters = counters();
    if hit {
        counters.cache_hits.fetch_add(1, Ordering::Relaxed);
    } else {
        counters.cache_misses.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub queries_total: u64,
    pub queries_failed: u64,
    pub queries_cancelled: u64,
    pub queries_timed_out: u64,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<u64>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub open_connections: usize,
    pub running_queries: usize,
}

/// Captures the counters; connection and query gauges come from the caller.
pub fn snapshot(open_connections: usize, running_queries: usize) -> MetricsSnapshot {
    let counters = counters();
    let total = counters.queries_total.load(Ordering::Relaxed);
    let duration_total = counters.duration_total_ms.load(Ordering::Relaxed);
    let max_ms = counters.duration_max_ms.load(Ordering::Relaxed);

    let avg_ms = if total > 0 {
        Some(duration_total as f64 / total as f64)
    } else {
        None
    };

    MetricsSnapshot {
        queries_total: total,
        queries_failed: counters.queries_failed.load(Ordering::Relaxed),
        queries_cancelled: counters.queries_cancelled.load(Ordering::Relaxed),
        queries_timed_out: counters.queries_timed_out.load(Ordering::Relaxed),
        avg_ms,
        max_ms: if total > 0 { Some(max_ms) } else { None },
        cache_hits: counters.cache_hits.load(Ordering::Relaxed),
        cache_misses: counters.cache_misses.load(Ordering::Relaxed),
        open_connections,
        running_queries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are process-wide and other tests bump them concurrently,
    // so only monotonic properties are asserted here.
    #[test]
    fn recording_moves_counters_forward() {
        let before = snapshot(0, 0);
        record_query(12, false);
        record_cancel();
        record_cache_lookup(true);
        record_cache_lookup(false);
        let after = snapshot(2, 1);

        assert!(after.queries_total > before.queries_total);
        assert!(after.queries_failed > before.queries_failed);
        assert!(after.queries_cancelled > before.queries_cancelled);
        assert!(after.cache_hits > before.cache_hits);
        assert!(after.cache_misses > before.cache_misses);
        assert!(after.max_ms.unwrap_or(0) >= 12);
        assert_eq!(after.open_connections, 2);
        assert_eq!(after.running_queries, 1);
    }
}
