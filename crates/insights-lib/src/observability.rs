//! Observability infrastructure for the insights service
//!
//! Provides:
//! - Prometheus metrics (discovery latency, cache hit rates, memory budget, evictions)
//! - Structured JSON logging for discovery and capacity events

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for discovery cycle latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<InsightsMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct InsightsMetricsInner {
    discovery_latency_seconds: Histogram,
    discovery_errors: IntCounter,
    refresh_errors: IntCounter,
    components_discovered: IntGauge,
    tenants_discovered: IntGauge,
    cache_hits: IntCounterVec,
    cache_misses: IntCounterVec,
    admission_rejections: IntCounterVec,
    memory_bytes: IntGauge,
    memory_peak_bytes: IntGauge,
    evictions: IntCounter,
    capacity_reports: IntCounter,
}

impl InsightsMetricsInner {
    fn new() -> Self {
        Self {
            discovery_latency_seconds: register_histogram!(
                "metrics_insights_discovery_latency_seconds",
                "Time spent running a full topology discovery cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register discovery_latency_seconds"),

            discovery_errors: register_int_counter!(
                "metrics_insights_discovery_errors_total",
                "Total number of failed discovery cycles"
            )
            .expect("Failed to register discovery_errors"),

            refresh_errors: register_int_counter!(
                "metrics_insights_cache_refresh_errors_total",
                "Total number of cache refresh cycles that fell back to stale data or failed"
            )
            .expect("Failed to register refresh_errors"),

            components_discovered: register_int_gauge!(
                "metrics_insights_components_discovered",
                "Number of backend components found in the last discovery cycle"
            )
            .expect("Failed to register components_discovered"),

            tenants_discovered: register_int_gauge!(
                "metrics_insights_tenants_discovered",
                "Number of tenants found in the last discovery cycle"
            )
            .expect("Failed to register tenants_discovered"),

            cache_hits: register_int_counter_vec!(
                "metrics_insights_cache_hits_total",
                "Cache reads served without triggering discovery",
                &["category"]
            )
            .expect("Failed to register cache_hits"),

            cache_misses: register_int_counter_vec!(
                "metrics_insights_cache_misses_total",
                "Cache reads that required a refresh",
                &["category"]
            )
            .expect("Failed to register cache_misses"),

            admission_rejections: register_int_counter_vec!(
                "metrics_insights_admission_rejections_total",
                "Fresh values rejected by the memory budget and served uncached",
                &["category"]
            )
            .expect("Failed to register admission_rejections"),

            memory_bytes: register_int_gauge!(
                "metrics_insights_cache_memory_bytes",
                "Estimated bytes currently held by cached topology data"
            )
            .expect("Failed to register memory_bytes"),

            memory_peak_bytes: register_int_gauge!(
                "metrics_insights_cache_memory_peak_bytes",
                "High-water mark of estimated cached bytes since startup"
            )
            .expect("Failed to register memory_peak_bytes"),

            evictions: register_int_counter!(
                "metrics_insights_evictions_total",
                "Total number of cache entries evicted under memory pressure"
            )
            .expect("Failed to register evictions"),

            capacity_reports: register_int_counter!(
                "metrics_insights_capacity_reports_total",
                "Total number of capacity reports generated"
            )
            .expect("Failed to register capacity_reports"),
        }
    }
}

/// Insights metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct InsightsMetrics {
    // This is just a marker - we use the global instance
    _private: (),
}

impl Default for InsightsMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl InsightsMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(InsightsMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &InsightsMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record a discovery cycle latency observation
    pub fn observe_discovery_latency(&self, duration_secs: f64) {
        self.inner().discovery_latency_seconds.observe(duration_secs);
    }

    /// Increment discovery errors counter
    pub fn inc_discovery_errors(&self) {
        self.inner().discovery_errors.inc();
    }

    /// Increment cache refresh errors counter
    pub fn inc_refresh_errors(&self) {
        self.inner().refresh_errors.inc();
    }

    /// Update component count from the last cycle
    pub fn set_components_discovered(&self, count: i64) {
        self.inner().components_discovered.set(count);
    }

    /// Update tenant count from the last cycle
    pub fn set_tenants_discovered(&self, count: i64) {
        self.inner().tenants_discovered.set(count);
    }

    /// Record a cache hit for the given category
    pub fn inc_cache_hit(&self, category: &str) {
        self.inner().cache_hits.with_label_values(&[category]).inc();
    }

    /// Record a cache miss for the given category
    pub fn inc_cache_miss(&self, category: &str) {
        self.inner().cache_misses.with_label_values(&[category]).inc();
    }

    /// Record an admission rejection for the given category
    pub fn inc_admission_rejections(&self, category: &str) {
        self.inner()
            .admission_rejections
            .with_label_values(&[category])
            .inc();
    }

    /// Update memory budget gauges
    pub fn set_memory_bytes(&self, current: i64, peak: i64) {
        self.inner().memory_bytes.set(current);
        self.inner().memory_peak_bytes.set(peak);
    }

    /// Add to the eviction counter
    pub fn inc_evictions(&self, count: u64) {
        self.inner().evictions.inc_by(count);
    }

    /// Increment the capacity report counter
    pub fn inc_capacity_reports(&self) {
        self.inner().capacity_reports.inc();
    }
}

/// Structured logger for significant service events
///
/// Provides consistent JSON-formatted logging for discovery cycles,
/// eviction rounds, and capacity findings.
#[derive(Clone)]
pub struct StructuredLogger {
    cluster_name: String,
}

impl StructuredLogger {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
        }
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "service_started",
            cluster = %self.cluster_name,
            version = %version,
            "Metrics insights service started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            cluster = %self.cluster_name,
            reason = %reason,
            "Metrics insights service shutting down"
        );
    }

    /// Log completion of a discovery cycle
    pub fn log_discovery_cycle(
        &self,
        namespace_root: &str,
        components: usize,
        tenants: usize,
        partial_failures: usize,
    ) {
        if partial_failures > 0 {
            warn!(
                event = "discovery_cycle_completed",
                cluster = %self.cluster_name,
                namespace_root = %namespace_root,
                components = components,
                tenants = tenants,
                partial_failures = partial_failures,
                "Discovery cycle completed with partial failures"
            );
        } else {
            info!(
                event = "discovery_cycle_completed",
                cluster = %self.cluster_name,
                namespace_root = %namespace_root,
                components = components,
                tenants = tenants,
                "Discovery cycle completed"
            );
        }
    }

    /// Log an eviction round triggered by memory pressure
    pub fn log_eviction_round(&self, evicted: usize, current_bytes: u64, max_bytes: u64) {
        warn!(
            event = "eviction_round",
            cluster = %self.cluster_name,
            evicted = evicted,
            current_bytes = current_bytes,
            max_bytes = max_bytes,
            "Evicted cache entries under memory pressure"
        );
    }

    /// Log a generated capacity report
    pub fn log_capacity_report(
        &self,
        tenant: &str,
        risk_level: &str,
        growth_rate: f64,
        projected_peak: f64,
    ) {
        match risk_level {
            "high" => warn!(
                event = "capacity_report_generated",
                cluster = %self.cluster_name,
                tenant = %tenant,
                risk_level = %risk_level,
                growth_rate = growth_rate,
                projected_peak = projected_peak,
                "High capacity risk for tenant"
            ),
            _ => info!(
                event = "capacity_report_generated",
                cluster = %self.cluster_name,
                tenant = %tenant,
                risk_level = %risk_level,
                growth_rate = growth_rate,
                projected_peak = projected_peak,
                "Capacity report generated"
            ),
        }
    }
}
