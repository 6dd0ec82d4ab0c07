//! Lock-free counters and periodic reporting
//!
//! Every recorder is a single relaxed atomic add and every counter is
//! monotonic, so `report()` is a plain snapshot with no reset.
//!
//! NOTE: Relaxed ordering only. These are statistics, never coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Geocode lookup latency bucket bounds (milliseconds)
/// Buckets: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, >25600
const LOOKUP_BOUNDS_MS: [u64; 10] = [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];
const NUM_BUCKETS: usize = 11;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_LOOKUP_BOUNDS_MS: [u64; 10] = LOOKUP_BOUNDS_MS;
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    LOOKUP_BOUNDS_MS.partition_point(|&bound| bound < latency_ms)
}

#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Upper bound of the bucket holding the given percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Last bucket reports twice the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

pub struct Metrics {
    /// Successful feed loads
    feed_loads_total: AtomicU64,
    /// Feed loads that failed to fetch or decode
    feed_failures_total: AtomicU64,
    /// Rows decoded across all loads
    rows_decoded_total: AtomicU64,
    /// Rows dropped for an unparseable start
    rows_dropped_total: AtomicU64,
    geocode_hits_total: AtomicU64,
    /// Cache misses, each of which becomes one external lookup
    geocode_misses_total: AtomicU64,
    geocode_failures_total: AtomicU64,
    filter_passes_total: AtomicU64,
    http_requests_total: AtomicU64,
    /// External lookup latency histogram
    lookup_buckets: [AtomicU64; NUM_BUCKETS],
    lookup_sum_ms: AtomicU64,
    lookup_max_ms: AtomicU64,
    started: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            feed_loads_total: AtomicU64::new(0),
            feed_failures_total: AtomicU64::new(0),
            rows_decoded_total: AtomicU64::new(0),
            rows_dropped_total: AtomicU64::new(0),
            geocode_hits_total: AtomicU64::new(0),
            geocode_misses_total: AtomicU64::new(0),
            geocode_failures_total: AtomicU64::new(0),
            filter_passes_total: AtomicU64::new(0),
            http_requests_total: AtomicU64::new(0),
            lookup_buckets: Default::default(),
            lookup_sum_ms: AtomicU64::new(0),
            lookup_max_ms: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    #[inline]
    pub fn record_feed_load(&self, rows_decoded: usize, rows_dropped: usize) {
        self.feed_loads_total.fetch_add(1, Ordering::Relaxed);
        self.rows_decoded_total.fetch_add(rows_decoded as u64, Ordering::Relaxed);
        self.rows_dropped_total.fetch_add(rows_dropped as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_feed_failure(&self) {
        self.feed_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_geocode_hit(&self) {
        self.geocode_hits_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_geocode_miss(&self) {
        self.geocode_misses_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_geocode_failure(&self) {
        self.geocode_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the latency of one external lookup
    #[inline]
    pub fn record_geocode_latency(&self, latency_ms: u64) {
        self.lookup_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        self.lookup_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        update_atomic_max(&self.lookup_max_ms, latency_ms);
    }

    #[inline]
    pub fn record_filter_pass(&self) {
        self.filter_passes_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_http_request(&self) {
        self.http_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters
    pub fn report(&self) -> MetricsSummary {
        let lookup_buckets = load_buckets(&self.lookup_buckets);
        let lookup_sum_ms = self.lookup_sum_ms.load(Ordering::Relaxed);
        let lookups: u64 = lookup_buckets.iter().sum();

        let geocode_hits = self.geocode_hits_total.load(Ordering::Relaxed);
        let geocode_misses = self.geocode_misses_total.load(Ordering::Relaxed);
        let resolved = geocode_hits + geocode_misses;
        let cache_hit_ratio = if resolved > 0 { geocode_hits as f64 / resolved as f64 } else { 0.0 };

        MetricsSummary {
            feed_loads: self.feed_loads_total.load(Ordering::Relaxed),
            feed_failures: self.feed_failures_total.load(Ordering::Relaxed),
            rows_decoded: self.rows_decoded_total.load(Ordering::Relaxed),
            rows_dropped: self.rows_dropped_total.load(Ordering::Relaxed),
            geocode_hits,
            geocode_misses,
            geocode_failures: self.geocode_failures_total.load(Ordering::Relaxed),
            cache_hit_ratio,
            filter_passes: self.filter_passes_total.load(Ordering::Relaxed),
            http_requests: self.http_requests_total.load(Ordering::Relaxed),
            lookup_buckets,
            lookup_sum_ms,
            lookup_avg_ms: if lookups > 0 { lookup_sum_ms / lookups } else { 0 },
            lookup_max_ms: self.lookup_max_ms.load(Ordering::Relaxed),
            lookup_p95_ms: percentile_from_buckets(&lookup_buckets, 0.95),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub feed_loads: u64,
    pub feed_failures: u64,
    pub rows_decoded: u64,
    pub rows_dropped: u64,
    pub geocode_hits: u64,
    pub geocode_misses: u64,
    pub geocode_failures: u64,
    /// Hits over hits plus misses, 0 before any resolution
    pub cache_hit_ratio: f64,
    pub filter_passes: u64,
    pub http_requests: u64,
    /// Lookup latency histogram
    /// Bounds: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, >25600 ms
    pub lookup_buckets: [u64; NUM_BUCKETS],
    pub lookup_sum_ms: u64,
    pub lookup_avg_ms: u64,
    pub lookup_max_ms: u64,
    pub lookup_p95_ms: u64,
    pub uptime_secs: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            feed_loads = %self.feed_loads,
            feed_failures = %self.feed_failures,
            rows_decoded = %self.rows_decoded,
            rows_dropped = %self.rows_dropped,
            geocode_hits = %self.geocode_hits,
            geocode_misses = %self.geocode_misses,
            geocode_failures = %self.geocode_failures,
            hit_ratio = format!("{:.2}", self.cache_hit_ratio),
            lookup_avg_ms = %self.lookup_avg_ms,
            lookup_p95_ms = %self.lookup_p95_ms,
            filter_passes = %self.filter_passes,
            http_requests = %self.http_requests,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let summary = Metrics::new().report();
        assert_eq!(summary.feed_loads, 0);
        assert_eq!(summary.geocode_hits, 0);
        assert_eq!(summary.cache_hit_ratio, 0.0);
        assert_eq!(summary.lookup_avg_ms, 0);
    }

    #[test]
    fn test_record_feed_load() {
        let metrics = Metrics::new();
        metrics.record_feed_load(10, 2);
        metrics.record_feed_load(5, 0);
        metrics.record_feed_failure();

        let summary = metrics.report();
        assert_eq!(summary.feed_loads, 2);
        assert_eq!(summary.rows_decoded, 15);
        assert_eq!(summary.rows_dropped, 2);
        assert_eq!(summary.feed_failures, 1);
    }

    #[test]
    fn test_totals_survive_report() {
        let metrics = Metrics::new();
        metrics.record_geocode_hit();
        metrics.record_geocode_hit();
        metrics.record_geocode_hit();
        metrics.record_geocode_miss();

        let first = metrics.report();
        let second = metrics.report();
        assert_eq!(first.geocode_hits, 3);
        assert_eq!(second.geocode_hits, 3);
        assert!((first.cache_hit_ratio - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_lookup_latency_histogram() {
        let metrics = Metrics::new();
        metrics.record_geocode_latency(30);
        metrics.record_geocode_latency(300);
        metrics.record_geocode_latency(90);

        let summary = metrics.report();
        assert_eq!(summary.lookup_avg_ms, 140);
        assert_eq!(summary.lookup_max_ms, 300);
        assert_eq!(summary.lookup_buckets[0], 1);
        assert_eq!(summary.lookup_buckets[1], 1);
        assert_eq!(summary.lookup_buckets[3], 1);

        // Snapshots never reset
        let next = metrics.report();
        assert_eq!(next.lookup_buckets, summary.lookup_buckets);
        assert_eq!(next.lookup_sum_ms, 420);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(51), 1);
        assert_eq!(bucket_index(25600), 9);
        assert_eq!(bucket_index(25601), 10);
    }

    #[test]
    fn test_percentile_computation() {
        let metrics = Metrics::new();
        for _ in 0..100 {
            metrics.record_geocode_latency(150);
        }
        assert_eq!(metrics.report().lookup_p95_ms, 200);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(Metrics::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let m = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        m.record_http_request();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.report().http_requests, 10_000);
    }
}
