use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Seconds background jobs get to finish after a shutdown signal.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Where report state and artifacts live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// PostgreSQL stores, artifacts under `storage_dir`.
    Local,
    /// Everything in process memory. Development only.
    Memory,
}

/// Report engine settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportsConfig {
    #[serde(default = "default_storage_backend")]
    pub storage_backend: StorageBackend,

    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Days a completed artifact is kept before the sweeper expires it.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Pending jobs picked per generation pass.
    #[serde(default = "default_worker_batch_size")]
    pub worker_batch_size: u32,

    /// Jobs generated concurrently within one pass.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_worker_interval")]
    pub worker_interval_secs: u64,

    #[serde(default = "default_progress_interval_rows")]
    pub progress_interval_rows: u64,

    /// Seconds a job may stay GENERATING before the worker fails it.
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,

    /// Row cap of the paginated document format.
    #[serde(default = "default_document_row_limit")]
    pub document_row_limit: u64,

    #[serde(default = "default_schedule_tick")]
    pub schedule_tick_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Upper bound on job ids accepted by one bulk request.
    #[serde(default = "default_max_bulk_items")]
    pub max_bulk_items: usize,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            storage_backend: default_storage_backend(),
            storage_dir: default_storage_dir(),
            retention_days: default_retention_days(),
            worker_batch_size: default_worker_batch_size(),
            worker_concurrency: default_worker_concurrency(),
            worker_interval_secs: default_worker_interval(),
            progress_interval_rows: default_progress_interval_rows(),
            generation_timeout_secs: default_generation_timeout(),
            document_row_limit: default_document_row_limit(),
            schedule_tick_secs: default_schedule_tick(),
            sweep_interval_secs: default_sweep_interval(),
            max_bulk_items: default_max_bulk_items(),
        }
    }
}

impl ReportsConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_shutdown_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_storage_backend() -> StorageBackend {
    StorageBackend::Local
}
fn default_storage_dir() -> PathBuf {
    PathBuf::from("./data/reports")
}
fn default_retention_days() -> i64 {
    domain::models::DEFAULT_RETENTION_DAYS
}
fn default_worker_batch_size() -> u32 {
    10
}
fn default_worker_concurrency() -> usize {
    2
}
fn default_worker_interval() -> u64 {
    5
}
fn default_progress_interval_rows() -> u64 {
    domain::services::export::DEFAULT_PROGRESS_INTERVAL_ROWS
}
fn default_generation_timeout() -> u64 {
    3600
}
fn default_document_row_limit() -> u64 {
    domain::services::export::DEFAULT_DOCUMENT_ROW_LIMIT
}
fn default_schedule_tick() -> u64 {
    60
}
fn default_sweep_interval() -> u64 {
    3600
}
fn default_max_bulk_items() -> usize {
    100
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with VR__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("VR")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;

        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Builds the config from embedded defaults so tests do not depend on
    /// the working directory.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            request_timeout_secs = 30
            cors_origins = []

            [database]
            url = ""
            max_connections = 5
            min_connections = 1
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "debug"
            format = "pretty"

            [reports]
            storage_backend = "memory"
            storage_dir = "./target/test-reports"
            retention_days = 30
            worker_batch_size = 10
            worker_concurrency = 2
            worker_interval_secs = 5
            progress_interval_rows = 100
            generation_timeout_secs = 3600
            document_row_limit = 1000
            schedule_tick_secs = 60
            sweep_interval_secs = 3600
            max_bulk_items = 100
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        Ok(cfg)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.reports.storage_backend == StorageBackend::Local && self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "VR__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        let reports = &self.reports;
        for (name, value) in [
            ("reports.worker_concurrency", reports.worker_concurrency as u64),
            ("reports.worker_batch_size", u64::from(reports.worker_batch_size)),
            ("reports.worker_interval_secs", reports.worker_interval_secs),
            ("reports.progress_interval_rows", reports.progress_interval_rows),
            ("reports.generation_timeout_secs", reports.generation_timeout_secs),
            ("reports.document_row_limit", reports.document_row_limit),
            ("reports.schedule_tick_secs", reports.schedule_tick_secs),
            ("reports.sweep_interval_secs", reports.sweep_interval_secs),
            ("reports.max_bulk_items", reports.max_bulk_items as u64),
        ] {
            if value == 0 {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if reports.retention_days < 1 {
            return Err(ConfigValidationError::InvalidValue(
                "reports.retention_days must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
