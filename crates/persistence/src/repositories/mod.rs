//! Repository implementations for database operations.
//!
//! Each repository implements one of the domain store traits.

use domain::services::StoreError;

pub mod report_job;
pub mod report_metrics;
pub mod report_schedule;
pub mod report_share;
pub mod report_template;
pub mod volunteer_data;

pub use report_job::ReportJobRepository;
pub use report_metrics::ReportMetricsRepository;
pub use report_schedule::ReportScheduleRepository;
pub use report_share::ReportShareRepository;
pub use report_template::ReportTemplateRepository;
pub use volunteer_data::PgVolunteerDataSource;

use domain::services::ReportStores;
use sqlx::PgPool;
use std::sync::Arc;

/// Maps a sqlx error onto the store taxonomy. Unique violations become
/// conflicts.
pub(crate) fn db_err(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => StoreError::Database(err.to_string()),
    }
}

/// Counters are `u64` in the domain and `BIGINT` in the database.
pub(crate) fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// PostgreSQL-backed store bundle.
pub fn pg_stores(pool: PgPool) -> ReportStores {
    ReportStores {
        jobs: Arc::new(ReportJobRepository::new(pool.clone())),
        metrics: Arc::new(ReportMetricsRepository::new(pool.clone())),
        shares: Arc::new(ReportShareRepository::new(pool.clone())),
        templates: Arc::new(ReportTemplateRepository::new(pool.clone())),
        schedules: Arc::new(ReportScheduleRepository::new(pool)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_i64_saturates() {
        assert_eq!(to_i64(7), 7);
        assert_eq!(to_i64(u64::MAX), i64::MAX);
    }

    #[test]
    fn test_db_err_maps_other_errors() {
        assert!(matches!(db_err(sqlx::Error::RowNotFound), StoreError::Database(_)));
    }
}
