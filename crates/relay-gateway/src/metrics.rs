//! Prometheus metrics.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `relay_requests_total` | Counter | `status` |
//! | `relay_cache_lookups_total` | Counter | `result` (`hit`, `miss`, `error`) |
//! | `relay_downstream_seconds` | Histogram | |
//! | `relay_blocklist_refresh_total` | Counter | `result` (`ok`, `error`) |

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;
use thiserror::Error;

const DOWNSTREAM_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

/// Gateway metric families, registered on a private [`Registry`].
///
/// Cloning shares the underlying collectors.
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    cache_lookups_total: IntCounterVec,
    downstream_seconds: Histogram,
    blocklist_refresh_total: IntCounterVec,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("relay_requests_total", "Gateway responses by HTTP status"),
            &["status"],
        )?;
        let cache_lookups_total = IntCounterVec::new(
            Opts::new("relay_cache_lookups_total", "Response cache lookups by result"),
            &["result"],
        )?;
        let downstream_seconds = Histogram::with_opts(
            HistogramOpts::new("relay_downstream_seconds", "Downstream call latency")
                .buckets(DOWNSTREAM_BUCKETS.to_vec()),
        )?;
        let blocklist_refresh_total = IntCounterVec::new(
            Opts::new("relay_blocklist_refresh_total", "Blocklist refresh cycles by result"),
            &["result"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(cache_lookups_total.clone()))?;
        registry.register(Box::new(downstream_seconds.clone()))?;
        registry.register(Box::new(blocklist_refresh_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            cache_lookups_total,
            downstream_seconds,
            blocklist_refresh_total,
        })
    }

    pub fn record_response(&self, status: u16) {
        self.requests_total
            .with_label_values(&[&status.to_string()])
            .inc();
    }

    pub fn record_cache_lookup(&self, result: &str) {
        self.cache_lookups_total.with_label_values(&[result]).inc();
    }

    pub fn observe_downstream(&self, elapsed: Duration) {
        self.downstream_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn record_blocklist_refresh(&self, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        self.blocklist_refresh_total
            .with_label_values(&[result])
            .inc();
    }

    pub fn responses_with_status(&self, status: u16) -> u64 {
        self.requests_total
            .with_label_values(&[&status.to_string()])
            .get()
    }

    pub fn cache_lookups(&self, result: &str) -> u64 {
        self.cache_lookups_total.with_label_values(&[result]).get()
    }

    pub fn blocklist_refreshes(&self, ok: bool) -> u64 {
        let result = if ok { "ok" } else { "error" };
        self.blocklist_refresh_total.with_label_values(&[result]).get()
    }

    /// Text exposition format for `/metrics`.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}
