//! # civic-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the civic jurisdiction engine.
//! Binds to a configurable port (default 8080).

use civic_api::state::{AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env();

    // Initialize structured tracing.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(?config, "starting civic-api");

    // Initialize database pool (optional: absent means in-memory only).
    let db_pool = civic_api::db::init_pool(config.database_url.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("Database initialization failed: {e}");
            e
        })?;

    let metrics = if config.metrics_enabled {
        Some(civic_api::middleware::metrics::install_recorder()?)
    } else {
        None
    };

    let port = config.port;
    let state = AppState::with_config(config)
        .with_pool(db_pool)
        .with_metrics(metrics);

    // Hydrate in-memory stores from database (if connected).
    state.hydrate_from_db().await.map_err(|e| {
        tracing::error!("Database hydration failed: {e}");
        e
    })?;

    let seeded = state.apply_seed().await.map_err(|e| {
        tracing::error!("Seeding failed: {e}");
        e
    })?;
    if seeded > 0 {
        tracing::info!(nodes = seeded, "hierarchy seeded");
    }

    let app = civic_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("civic-api listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
