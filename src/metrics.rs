// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "pipeline_items_handled_total",
            "Items dispatched to the active storage set."
        );
        describe_counter!(
            "pipeline_items_filtered_total",
            "Items rejected by the filter chain."
        );
        describe_counter!(
            "pipeline_items_dropped_total",
            "Items discarded by watermark clears."
        );
        describe_gauge!("pipeline_queue_depth", "Current ingestion queue depth.");
        describe_counter!("fetch_runs_total", "Completed stream fetch runs.");
        describe_counter!(
            "fetch_errors_total",
            "Per-feed poll failures inside fetch runs."
        );
        describe_counter!(
            "storage_dispatch_errors_total",
            "Failed store/update/delete calls, by storage."
        );
        describe_gauge!("storage_healthy", "Per-storage health (1 active, 0 eliminated).");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize the Prometheus recorder and describe the pipeline series.
    pub fn init() -> Self {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("prometheus: install recorder");
        ensure_metrics_described();
        Self { handle }
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
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
