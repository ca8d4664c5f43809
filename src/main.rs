use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use visitlog::api::{self, AppState};
use visitlog::clock::{Clock, SystemClock};
use visitlog::config::Config;
use visitlog::dispatcher::VisitDispatcher;
use visitlog::geo::{GeoCache, IpInfoProvider};
use visitlog::shutdown::shutdown_signal;
use visitlog::stats::StatsAggregator;
use visitlog::storage;
use visitlog::writer::VisitWriter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let storage = storage::connect(&config.database).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let provider = Arc::new(IpInfoProvider::from_config(&config.geo)?);
    let geo = Arc::new(GeoCache::new(
        provider,
        Arc::clone(&clock),
        Duration::from_secs(config.geo.cache_ttl_secs),
    ));
    info!(
        "🌍 Geolocation via {} (cache TTL {}s, timeout {}s)",
        config.geo.base_url, config.geo.cache_ttl_secs, config.geo.timeout_secs
    );

    let writer = VisitWriter::spawn(Arc::clone(&storage), Arc::clone(&clock), &config.writer);

    let state = Arc::new(AppState {
        dispatcher: VisitDispatcher::new(geo, writer.clone()),
        stats: StatsAggregator::new(storage, clock),
    });
    let router = api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("🚀 Server listening on http://{}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped, flushing pending visits...");
    writer.shutdown().await?;

    Ok(())
}
