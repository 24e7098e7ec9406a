use axum::{middleware, routing::get, Router};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::jobs::{JobScheduler, ReportGenerationJob, ReportRetentionJob, ScheduleDispatchJob};
use crate::middleware::{metrics_handler, metrics_middleware, request_id};
use crate::routes::{health, report_schedules, report_shares, report_templates, reports};
use crate::services::{
    GenerationSettings, ReportGenerationService, ReportJobService, ReportRetentionService,
    ReportScheduleService, ReportShareService, ReportTemplateService,
};
use domain::services::{
    AdapterRegistry, ArtifactStorage, ReportStores, StrategyFactory, VolunteerDataSource,
};

/// Expired jobs handled per retention pass.
const SWEEP_BATCH_SIZE: u32 = 500;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Present when running against PostgreSQL.
    pub pool: Option<PgPool>,
    pub storage_backend: &'static str,
    pub generation: ReportGenerationService,
    pub reports: ReportJobService,
    pub shares: ReportShareService,
    pub schedules: ReportScheduleService,
    pub templates: ReportTemplateService,
    pub retention: ReportRetentionService,
}

impl AppState {
    /// Wires the report services on top of the given stores, artifact
    /// storage and volunteer data source.
    pub fn new(
        config: Config,
        stores: ReportStores,
        storage: Arc<dyn ArtifactStorage>,
        data_source: Arc<dyn VolunteerDataSource>,
        pool: Option<PgPool>,
    ) -> Self {
        let reports_config = &config.reports;
        let retention_window = reports_config.retention();
        let strategies = StrategyFactory::with_defaults();

        let generation = ReportGenerationService::new(
            stores.clone(),
            Arc::clone(&storage),
            AdapterRegistry::with_defaults(data_source),
            strategies.clone(),
            GenerationSettings::from(reports_config),
        );
        let reports = ReportJobService::new(
            stores.clone(),
            Arc::clone(&storage),
            generation.clone(),
            retention_window,
            reports_config.max_bulk_items,
        );
        let shares = ReportShareService::new(
            stores.clone(),
            Arc::clone(&storage),
            reports_config.max_bulk_items,
        );
        let schedules = ReportScheduleService::new(stores.clone(), generation.clone(), retention_window);
        let templates = ReportTemplateService::new(stores.clone(), strategies);
        let storage_backend = storage.backend_name();
        let retention = ReportRetentionService::new(stores, storage, SWEEP_BATCH_SIZE);

        Self {
            config: Arc::new(config),
            pool,
            storage_backend,
            generation,
            reports,
            shares,
            schedules,
            templates,
            retention,
        }
    }

    /// Registers the generation worker, the schedule dispatcher and the
    /// retention sweeper.
    pub fn register_jobs(&self, scheduler: &mut JobScheduler) {
        let reports = &self.config.reports;
        scheduler.register(ReportGenerationJob::new(
            self.generation.clone(),
            reports.worker_batch_size,
            reports.worker_interval_secs,
        ));
        scheduler.register(ScheduleDispatchJob::new(
            self.schedules.clone(),
            reports.schedule_tick_secs,
        ));
        scheduler.register(ReportRetentionJob::new(
            self.retention.clone(),
            reports.sweep_interval_secs,
        ));
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let cors = if config.server.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    let report_routes = Router::new()
        .nest("/api/v1/reports/templates", report_templates::router())
        .nest("/api/v1/reports/schedules", report_schedules::router())
        .nest("/api/v1/reports/shares", report_shares::router())
        .nest("/api/v1/reports", reports::router());

    Router::new()
        .merge(public_routes)
        .merge(report_routes)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id))
        .layer(cors)
        .with_state(state)
}
