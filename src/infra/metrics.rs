//! Lock-free service counters and periodic summaries
//!
//! Counters are plain atomics updated with Relaxed ordering; they are statistics
//! only and never used for coordination. `report()` swaps the per-interval values
//! back to zero so each summary covers one reporting window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
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

pub struct Metrics {
    /// Reports accepted and stored (monotonic)
    reports_ingested: AtomicU64,
    /// Submissions rejected by validation (monotonic)
    reports_rejected: AtomicU64,
    /// Reports removed by explicit delete (monotonic)
    reports_deleted: AtomicU64,
    /// Successful undo operations (monotonic)
    undo_total: AtomicU64,
    /// Reports removed by compaction (monotonic)
    reports_compacted: AtomicU64,
    /// Route plans served (monotonic)
    route_requests: AtomicU64,
    /// Route plans that used the straight-line fallback (monotonic)
    route_fallbacks: AtomicU64,
    /// Route plans since last report (reset on report)
    routes_since_report: AtomicU64,
    /// Sum of route planning latencies in microseconds (reset on report)
    route_latency_sum_us: AtomicU64,
    /// Max route planning latency in microseconds (reset on report)
    route_latency_max_us: AtomicU64,
    last_report: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            reports_ingested: AtomicU64::new(0),
            reports_rejected: AtomicU64::new(0),
            reports_deleted: AtomicU64::new(0),
            undo_total: AtomicU64::new(0),
            reports_compacted: AtomicU64::new(0),
            route_requests: AtomicU64::new(0),
            route_fallbacks: AtomicU64::new(0),
            routes_since_report: AtomicU64::new(0),
            route_latency_sum_us: AtomicU64::new(0),
            route_latency_max_us: AtomicU64::new(0),
            last_report: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_report_ingested(&self) {
        self.reports_ingested.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_report_rejected(&self) {
        self.reports_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_report_deleted(&self) {
        self.reports_deleted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_undo(&self) {
        self.undo_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_compacted(&self, removed: usize) {
        self.reports_compacted.fetch_add(removed as u64, Ordering::Relaxed);
    }

    /// Record one finished route plan
    pub fn record_route(&self, latency_us: u64, fallback: bool) {
        self.route_requests.fetch_add(1, Ordering::Relaxed);
        self.routes_since_report.fetch_add(1, Ordering::Relaxed);
        if fallback {
            self.route_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
        self.route_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.route_latency_max_us, latency_us);
    }

    pub fn reports_ingested(&self) -> u64 {
        self.reports_ingested.load(Ordering::Relaxed)
    }

    pub fn route_fallbacks(&self) -> u64 {
        self.route_fallbacks.load(Ordering::Relaxed)
    }

    /// Snapshot counters and reset the per-window values
    pub fn report(&self, cells: usize, reports: usize) -> MetricsSummary {
        self.summarize(cells, reports, true)
    }

    /// Snapshot counters without closing the current window (scrape path)
    pub fn peek(&self, cells: usize, reports: usize) -> MetricsSummary {
        self.summarize(cells, reports, false)
    }

    fn summarize(&self, cells: usize, reports: usize, reset: bool) -> MetricsSummary {
        let elapsed_secs = {
            let mut last = self.last_report.lock();
            let elapsed = last.elapsed().as_secs_f64();
            if reset {
                *last = Instant::now();
            }
            elapsed
        };

        let take = |counter: &AtomicU64| {
            if reset {
                counter.swap(0, Ordering::Relaxed)
            } else {
                counter.load(Ordering::Relaxed)
            }
        };
        let routes = take(&self.routes_since_report);
        let latency_sum = take(&self.route_latency_sum_us);
        let latency_max = take(&self.route_latency_max_us);

        MetricsSummary {
            cells,
            reports,
            reports_ingested: self.reports_ingested.load(Ordering::Relaxed),
            reports_rejected: self.reports_rejected.load(Ordering::Relaxed),
            reports_deleted: self.reports_deleted.load(Ordering::Relaxed),
            undo_total: self.undo_total.load(Ordering::Relaxed),
            reports_compacted: self.reports_compacted.load(Ordering::Relaxed),
            route_requests: self.route_requests.load(Ordering::Relaxed),
            route_fallbacks: self.route_fallbacks.load(Ordering::Relaxed),
            routes_per_min: if elapsed_secs > 0.0 { routes as f64 * 60.0 / elapsed_secs } else { 0.0 },
            route_latency_avg_us: if routes > 0 { latency_sum / routes } else { 0 },
            route_latency_max_us: latency_max,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub cells: usize,
    pub reports: usize,
    pub reports_ingested: u64,
    pub reports_rejected: u64,
    pub reports_deleted: u64,
    pub undo_total: u64,
    pub reports_compacted: u64,
    pub route_requests: u64,
    pub route_fallbacks: u64,
    pub routes_per_min: f64,
    pub route_latency_avg_us: u64,
    pub route_latency_max_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            cells = %self.cells,
            reports = %self.reports,
            ingested = %self.reports_ingested,
            rejected = %self.reports_rejected,
            deleted = %self.reports_deleted,
            undone = %self.undo_total,
            compacted = %self.reports_compacted,
            routes = %self.route_requests,
            route_fallbacks = %self.route_fallbacks,
            routes_per_min = %format!("{:.1}", self.routes_per_min),
            route_avg_us = %self.route_latency_avg_us,
            route_max_us = %self.route_latency_max_us,
            "metrics_summary"
        );
    }
}
