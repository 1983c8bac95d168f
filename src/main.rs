use formosa::analysis::IndicatorService;
use formosa::api;
use formosa::datasource::{ExchangeFeed, TwseFeed};
use formosa::realtime::RealtimeService;
use formosa::sync::BulkSyncWorker;
use formosa::{init_db, Config, Repository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let feed: Arc<dyn ExchangeFeed> = Arc::new(TwseFeed::new(
        config.twse_api_url.clone(),
        config.twse_mis_url.clone(),
    ));

    let realtime = Arc::new(RealtimeService::new(
        feed.clone(),
        Duration::from_secs(config.broadcast_interval_secs),
    ));
    realtime.clone().start_broadcaster().await;

    let bulk_sync = Arc::new(BulkSyncWorker::new(
        repo.clone(),
        feed.clone(),
        Duration::from_secs(config.bulk_sync_delay_secs),
        config.bulk_sync_complete_threshold,
        config.ohlcv_retention_years,
    ));

    let indicators = Arc::new(IndicatorService::new(
        repo.clone(),
        config.indicator_cache_ttl_secs,
    ));

    let app = api::create_router(api::AppState {
        repo,
        realtime: realtime.clone(),
        bulk_sync,
        indicators,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        realtime.shutdown().await;
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }

    realtime.shutdown().await;
}
