use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use domain::services::{ArtifactStorage, InMemoryDataSource, ReportStores, VolunteerDataSource};
use persistence::repositories::{pg_stores, PgVolunteerDataSource};
use persistence::{InMemoryArtifactStorage, InMemoryReportStore, LocalArtifactStorage};
use reports_api::app::{create_app, AppState};
use reports_api::config::{Config, StorageBackend};
use reports_api::jobs::JobScheduler;
use reports_api::middleware;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    middleware::logging::init_logging(&config.logging);

    if let Err(e) = middleware::init_metrics() {
        warn!(error = %e, "Prometheus recorder not installed");
    }

    info!("Starting volunteer report engine v{}", env!("CARGO_PKG_VERSION"));

    let state = match config.reports.storage_backend {
        StorageBackend::Local => {
            let pool =
                persistence::db::create_pool(&(&config.database).into()).await?;

            info!("Running database migrations...");
            persistence::db::run_migrations(&pool)
                .await
                .context("database migrations failed")?;
            info!("Migrations completed");

            let stores = pg_stores(pool.clone());
            let storage: Arc<dyn ArtifactStorage> =
                Arc::new(LocalArtifactStorage::new(config.reports.storage_dir.clone()));
            let source: Arc<dyn VolunteerDataSource> =
                Arc::new(PgVolunteerDataSource::new(pool.clone()));
            AppState::new(config.clone(), stores, storage, source, Some(pool))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; reports are lost on restart");
            let stores = ReportStores::from_single(Arc::new(InMemoryReportStore::new()));
            let storage: Arc<dyn ArtifactStorage> = Arc::new(InMemoryArtifactStorage::new());
            let source: Arc<dyn VolunteerDataSource> = Arc::new(InMemoryDataSource::new());
            AppState::new(config.clone(), stores, storage, source, None)
        }
    };

    let mut scheduler = JobScheduler::new();
    state.register_jobs(&mut scheduler);
    scheduler.start();
    info!(jobs = ?scheduler.job_names(), "Background jobs started");

    let app = create_app(state);

    let addr = config.socket_addr()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, waiting for background jobs");
    scheduler.shutdown();
    scheduler
        .wait_for_shutdown(Duration::from_secs(config.server.shutdown_timeout_secs))
        .await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
