use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cache;
mod config;
mod db;
mod http;
mod ingest;
mod messaging;
mod metrics;
mod models;

use cache::OrderCache;
use config::Config;
use db::PgOrderStore;
use http::AppState;
use ingest::IngestPipeline;
use metrics::Metrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_ingest=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order ingest service");

    let config = Config::from_env();

    // === 1. Connect to Postgres and bootstrap the schema ===
    tracing::info!(host = %config.db_host, db = %config.db_name, "Connecting to Postgres");
    let pool = db::connect(&config).await?;
    db::ensure_schema(&pool).await?;
    tracing::info!("Connected to Postgres");

    let cache = Arc::new(OrderCache::new());
    let metrics = Arc::new(Metrics::new()?);
    let store = PgOrderStore::new(pool);

    // === 2. Warm replay: rebuild the cache before serving reads ===
    let loaded = ingest::warm_replay(&store, &cache).await;
    metrics.cache_entries.set(cache.len() as i64);
    tracing::info!(orders = loaded, "📦 Warm replay finished");

    // === 3. HTTP server (read path, metrics, health) on its own runtime ===
    let state = AppState {
        cache: Arc::clone(&cache),
        metrics: Arc::clone(&metrics),
    };
    let http_port = config.http_port;
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("Failed to build HTTP runtime");
        rt.block_on(async {
            if let Err(e) = http::start_http_server(state, http_port).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    });

    // === 4. Consume the orders topic until shutdown ===
    let pipeline = IngestPipeline::new(store, Arc::clone(&cache), Arc::clone(&metrics));
    let consumer_config = config.clone();
    let consumer = tokio::spawn(async move {
        if let Err(e) = messaging::run_consumer(&consumer_config, &pipeline).await {
            tracing::error!("Consumer error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    consumer.abort();
    tracing::info!("Shutdown complete");

    Ok(())
}
