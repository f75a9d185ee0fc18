use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use wallet_engine::api::{create_router, AppState};
use wallet_engine::config::Settings;
use wallet_engine::observability::{init_logging, init_metrics, HealthChecker, LogConfig};
use wallet_engine::repositories::PgStore;
use wallet_engine::services::{GatewayRegistry, HttpNotifier, TransactionService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;
    init_logging(&LogConfig::from(&settings.application));
    info!("Configuration loaded");

    let metrics_handle = init_metrics()?;

    // Connect to PostgreSQL
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;
    info!("Database connection established");

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations applied successfully");

    let store = Arc::new(PgStore::new(pool.clone()));
    let gateways = GatewayRegistry::from_settings(&settings.gateways.a, &settings.gateways.b)?;
    let notifier = Arc::new(HttpNotifier::new(&settings.notifier)?);
    let service = Arc::new(TransactionService::new(
        store.clone(),
        store,
        gateways,
        notifier,
        settings.notifier.sender.clone(),
    ));

    let state = AppState::new(service, Arc::new(HealthChecker::new(Some(pool)))).with_metrics(metrics_handle);
    let app = create_router(state);

    let addr = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
