use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::config::FeedsConfig;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and publish the configured TTLs.
    /// Fails if a recorder is already installed in this process.
    pub fn init(config: &FeedsConfig) -> Result<Self, BuildError> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        describe_all();

        gauge!("cache_ttl_seconds", "class" => "sentiment").set(config.sentiment_ttl().as_secs_f64());
        for (name, ds) in &config.datasets {
            gauge!("cache_ttl_seconds", "class" => name.clone())
                .set(config.dataset_ttl(ds).as_secs_f64());
        }

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// Describe once per process for callers that run before or without `init`.
pub(crate) fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(describe_all);
}

/// Every series this crate emits. `init` re-runs it against the new recorder.
pub(crate) fn describe_all() {
    describe_counter!("fetch_attempts_total", "Source attempts made by cascades.");
    describe_counter!(
        "fetch_source_errors_total",
        "Source attempts that failed (network or schema)."
    );
    describe_counter!(
        "fetch_cascade_exhausted_total",
        "Cascade runs that ended without records."
    );
    describe_histogram!("fetch_parse_ms", "Payload parse + normalize time in milliseconds.");
    describe_counter!("cache_hits_total", "Memoized calls served from cache.");
    describe_counter!("cache_misses_total", "Memoized calls that ran the fetcher.");
    describe_counter!("sentiment_items_total", "Headlines sampled, by source type.");
    describe_counter!(
        "sentiment_template_errors_total",
        "Query templates whose search request or feed parse failed."
    );
    describe_histogram!("sentiment_parse_ms", "RSS feed parse time in milliseconds.");
    describe_gauge!("cache_ttl_seconds", "Configured cache TTL per data class.");
}
