use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use feescan_indexer::api;
use feescan_indexer::api::cache::ResponseCache;
use feescan_indexer::client::ClientPool;
use feescan_indexer::config::Config;
use feescan_indexer::control::ControlPlane;
use feescan_indexer::indexer::types::ScanSettings;
use feescan_indexer::supervisor::Supervisor;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging (set RUST_LOG=info for output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("Feescan Indexer starting");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    tracing::info!("Configuration loaded from {}", config_path);

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|e| eyre::eyre!("Failed to connect to database: {}", e))?;

    tracing::info!("Connected to PostgreSQL");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| eyre::eyre!("Failed to run migrations: {}", e))?;

    tracing::info!("Database migrations complete");

    // Wire the engine: client pool, supervisor, control plane, cache
    let shutdown = CancellationToken::new();
    let clients = Arc::new(ClientPool::new(config.ingestion.retry_base_delay()));
    let supervisor = Arc::new(Supervisor::new(
        pool.clone(),
        clients.clone(),
        ScanSettings::from_config(&config.ingestion),
        config.ingestion.shutdown_budget(),
        shutdown.clone(),
    ));

    let cache = Arc::new(ResponseCache::new(Duration::from_millis(
        config.api.cache_ttl_ms,
    )));
    let control = Arc::new(
        ControlPlane::new(
            pool.clone(),
            clients.clone(),
            supervisor.clone(),
            config.ingestion.clone(),
        )
        .with_mutation_hook(cache.clone()),
    );

    // Start a worker for every enabled chain in the registry
    supervisor.start_enabled().await?;
    tracing::info!("Chain workers started");

    // Serve the API alongside the workers
    let api_pool = pool.clone();
    let api_control = control.clone();
    let api_cache = cache.clone();
    let host = config.api.host.clone();
    let port = config.api.port;
    let api_task = tokio::spawn(async move {
        if let Err(e) = api::serve(api_pool, api_control, api_cache, &host, port).await {
            tracing::error!(error = %e, "API server failed");
        }
    });

    tracing::info!("Feescan Indexer running. Press Ctrl+C to stop.");

    // Wait for shutdown signal, then tear down in reverse order
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping all workers...");
    shutdown.cancel();

    supervisor.graceful_shutdown().await;
    api_task.abort();
    pool.close().await;

    tracing::info!("Feescan Indexer stopped gracefully");
    Ok(())
}
