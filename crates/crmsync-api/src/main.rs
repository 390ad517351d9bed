mod config;
mod error;
mod platform;
mod rate_limit;
mod routes;
mod signature;

use std::sync::Arc;
use std::time::Duration;

use crmsync_core::db::Database;
use crmsync_core::sync::SyncStores;
use crmsync_core::SyncEngine;

use config::AppConfig;
use platform::HttpContactPlatform;
use routes::{app_router, AppState};

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("crmsync_api=info".parse()?),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting crmsync-api with config: {:?}", config);

    let settings = config.sync_settings();
    settings.validate()?;

    let db = Database::open(&config.database_path).await?;
    let stores = SyncStores::libsql(&db, &settings);

    let source = HttpContactPlatform::new(
        "source",
        &config.source_api_url,
        config.source_api_token.clone(),
        config.platform_http_timeout,
    )?;
    let target = HttpContactPlatform::new(
        "target",
        &config.target_api_url,
        config.target_api_token.clone(),
        config.platform_http_timeout,
    )?;

    let engine = Arc::new(SyncEngine::new(
        stores.clone(),
        Arc::new(source),
        Arc::new(target),
        settings,
    ));
    spawn_housekeeping(stores);

    let state = AppState::new(config, engine);
    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("crmsync-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    drop(db);
    Ok(())
}

/// Periodically drop expired ledger entries and sync errors.
fn spawn_housekeeping(stores: SyncStores) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            interval.tick().await;
            match stores.ledger.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Purged expired ledger entries"),
                Err(error) => tracing::warn!("Ledger purge failed: {error}"),
            }
            match stores.errors.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Purged expired sync errors"),
                Err(error) => tracing::warn!("Sync error purge failed: {error}"),
            }
        }
    });
}
