//! streamhub — Binary Entrypoint
//! Wires the configured plugins into the scheduler and the dispatch
//! pipeline, exposes the status/metrics HTTP surface, and tears everything
//! down in order on ctrl-c.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use streamhub::api::{self, AppState};
use streamhub::config::Config;
use streamhub::handler::{PipelineConfig, StorageHandler};
use streamhub::metrics::Metrics;
use streamhub::monitor::StreamsMonitor;
use streamhub::plugins::PluginRegistry;
use streamhub::queue::IngestionQueue;
use streamhub::reconfig;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("streamhub=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::load_default()?;
    let registry = PluginRegistry::with_builtins();

    let queue = Arc::new(IngestionQueue::new());
    let handler = Arc::new(StorageHandler::new(
        Arc::clone(&queue),
        PipelineConfig {
            consumers: config.pipeline.consumers,
            watermark: config.pipeline.watermark,
            health_interval: config.pipeline.health_interval(),
        },
    ));

    // A plugin that fails to resolve is skipped and logged, never fatal to
    // the pipeline as a whole.
    for entry in &config.storages {
        match registry.build_storage(&entry.kind, &entry.params) {
            Ok(storage) => {
                if let Err(e) = handler.open_and_register(storage).await {
                    tracing::warn!(kind = %entry.kind, error = ?e, "storage skipped");
                }
            }
            Err(e) => tracing::warn!(kind = %entry.kind, error = ?e, "storage skipped"),
        }
    }
    for entry in &config.filters {
        match registry.build_filter(&entry.kind, &entry.params) {
            Ok(filter) => handler.add_filter(filter),
            Err(e) => tracing::warn!(kind = %entry.kind, error = ?e, "filter skipped"),
        }
    }
    for entry in &config.processors {
        match registry.build_processor(&entry.kind, &entry.params) {
            Ok(processor) => handler.add_processor(processor),
            Err(e) => tracing::warn!(kind = %entry.kind, error = ?e, "processor skipped"),
        }
    }

    let monitor = Arc::new(StreamsMonitor::new(
        Arc::clone(&queue),
        config.scheduler.tick(),
        config.scheduler.fetch_period(),
    ));
    for entry in &config.streams {
        let id = entry.stream_id().to_string();
        match registry.build_stream(&entry.kind, &entry.params) {
            Ok(stream) => {
                if let Err(e) = stream.open().await {
                    tracing::warn!(stream = %id, error = ?e, "stream open failed, registering anyway");
                }
                monitor.add_stream(&id, stream);
                for feed in &entry.feeds {
                    if let Err(e) = monitor.add_feed(&id, feed.clone()) {
                        tracing::warn!(stream = %id, error = ?e, "initial feed skipped");
                    }
                }
            }
            Err(e) => tracing::warn!(stream = %id, kind = %entry.kind, error = ?e, "stream skipped"),
        }
    }

    handler.start();
    monitor.start();

    let (reconfig_tx, reconfig_rx) = mpsc::channel(64);
    let reconfig_handle = reconfig::spawn_listener(Arc::clone(&monitor), reconfig_rx);

    let metrics = Metrics::init();
    let state = AppState {
        handler: Arc::clone(&handler),
        monitor: Arc::clone(&monitor),
        reconfig_tx: reconfig_tx.clone(),
    };
    let router = api::create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&config.api.bind)
        .await
        .with_context(|| format!("binding {}", config.api.bind))?;
    tracing::info!(bind = %config.api.bind, "status api listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving status api")?;

    // Orderly teardown: stop pulling first, then let consumers drain and
    // close every storage.
    tracing::info!("shutting down");
    monitor.stop().await;
    drop(reconfig_tx);
    let _ = reconfig_handle.await;
    handler.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
