use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Tracks the ingestion pipeline (accepted, rejected and failed messages
// plus latency), the cache population, and the read path. Everything
// registers against one Registry that /metrics serves.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Ingestion
    pub orders_ingested: IntCounterVec,
    pub orders_rejected: IntCounterVec,
    pub ingest_failures: IntCounter,
    pub ingest_duration: Histogram,

    // Cache
    pub cache_entries: IntGauge,

    // Read path
    pub order_lookups: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_ingested = IntCounterVec::new(
            Opts::new("orders_ingested_total", "Orders persisted and cached"),
            &["outcome"],
        )?;
        registry.register(Box::new(orders_ingested.clone()))?;

        let orders_rejected = IntCounterVec::new(
            Opts::new("orders_rejected_total", "Messages dropped before persistence"),
            &["reason"],
        )?;
        registry.register(Box::new(orders_rejected.clone()))?;

        let ingest_failures = IntCounter::new(
            "ingest_failures_total",
            "Ingestions aborted by a store error",
        )?;
        registry.register(Box::new(ingest_failures.clone()))?;

        let ingest_duration = Histogram::with_opts(
            HistogramOpts::new("ingest_duration_seconds", "End-to-end ingest latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(ingest_duration.clone()))?;

        let cache_entries =
            IntGauge::new("cache_entries", "Distinct orders held in the cache")?;
        registry.register(Box::new(cache_entries.clone()))?;

        let order_lookups = IntCounterVec::new(
            Opts::new("order_lookups_total", "Read-path lookups by result"),
            &["result"],
        )?;
        registry.register(Box::new(order_lookups.clone()))?;

        Ok(Self {
            registry,
            orders_ingested,
            orders_rejected,
            ingest_failures,
            ingest_duration,
            cache_entries,
            order_lookups,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record a completed ingestion
    pub fn record_accepted(&self, outcome: &str, duration_secs: f64) {
        self.orders_ingested.with_label_values(&[outcome]).inc();
        self.ingest_duration.observe(duration_secs);
    }

    /// Helper to record a rejected message
    pub fn record_rejected(&self, reason: &str) {
        self.orders_rejected.with_label_values(&[reason]).inc();
    }

    /// Helper to record a store failure during ingestion
    pub fn record_failure(&self) {
        self.ingest_failures.inc();
    }

    /// Helper to record a read-path lookup
    pub fn record_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.order_lookups.with_label_values(&[result]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(metrics.registry.gather().len() > 0);
    }

    #[test]
    fn test_record_accepted() {
        let metrics = Metrics::new().unwrap();
        metrics.record_accepted("inserted", 0.05);
        metrics.record_accepted("duplicate", 0.01);

        assert_eq!(
            metrics.orders_ingested.with_label_values(&["inserted"]).get(),
            1
        );
        assert_eq!(
            metrics.orders_ingested.with_label_values(&["duplicate"]).get(),
            1
        );
        assert_eq!(metrics.ingest_duration.get_sample_count(), 2);
    }

    #[test]
    fn test_record_rejected_and_failure() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rejected("decode");
        metrics.record_rejected("decode");
        metrics.record_failure();

        assert_eq!(
            metrics.orders_rejected.with_label_values(&["decode"]).get(),
            2
        );
        assert_eq!(metrics.ingest_failures.get(), 1);
    }

    #[test]
    fn test_record_lookup() {
        let metrics = Metrics::new().unwrap();
        metrics.record_lookup(true);
        metrics.record_lookup(false);
        metrics.record_lookup(false);

        assert_eq!(metrics.order_lookups.with_label_values(&["hit"]).get(), 1);
        assert_eq!(metrics.order_lookups.with_label_values(&["miss"]).get(), 2);
    }
}
