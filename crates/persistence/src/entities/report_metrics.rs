//! Report metrics entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::ReportMetrics;
use sqlx::FromRow;
use uuid::Uuid;

use super::non_negative;

pub const REPORT_METRICS_COLUMNS: &str = "job_id, query_time_ms, processing_time_ms, \
    export_time_ms, memory_usage_mb, cpu_time_ms, rows_processed, columns_included, \
    data_completeness_percent, error_count, warning_count, download_count, last_downloaded, \
    created_at, updated_at";

/// Database row mapping for the report_metrics table (one row per job).
#[derive(Debug, Clone, FromRow)]
pub struct ReportMetricsEntity {
    pub job_id: Uuid,
    pub query_time_ms: i64,
    pub processing_time_ms: i64,
    pub export_time_ms: i64,
    pub memory_usage_mb: Option<f64>,
    pub cpu_time_ms: Option<i64>,
    pub rows_processed: i64,
    pub columns_included: i32,
    pub data_completeness_percent: f64,
    pub error_count: i32,
    pub warning_count: i32,
    pub download_count: i64,
    pub last_downloaded: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ReportMetricsEntity> for ReportMetrics {
    fn from(entity: ReportMetricsEntity) -> Self {
        ReportMetrics {
            job_id: entity.job_id,
            query_time_ms: non_negative(entity.query_time_ms),
            processing_time_ms: non_negative(entity.processing_time_ms),
            export_time_ms: non_negative(entity.export_time_ms),
            memory_usage_mb: entity.memory_usage_mb,
            cpu_time_ms: entity.cpu_time_ms.map(non_negative),
            rows_processed: non_negative(entity.rows_processed),
            columns_included: entity.columns_included.max(0) as u32,
            data_completeness_percent: entity.data_completeness_percent,
            error_count: entity.error_count.max(0) as u32,
            warning_count: entity.warning_count.max(0) as u32,
            download_count: non_negative(entity.download_count),
            last_downloaded: entity.last_downloaded,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_to_domain() {
        let now = Utc::now();
        let metrics: ReportMetrics = ReportMetricsEntity {
            job_id: Uuid::new_v4(),
            query_time_ms: 12,
            processing_time_ms: 30,
            export_time_ms: 45,
            memory_usage_mb: None,
            cpu_time_ms: Some(-1),
            rows_processed: 500,
            columns_included: 10,
            data_completeness_percent: 97.5,
            error_count: 0,
            warning_count: 1,
            download_count: 3,
            last_downloaded: Some(now),
            created_at: now,
            updated_at: now,
        }
        .into();

        assert_eq!(metrics.rows_processed, 500);
        assert_eq!(metrics.cpu_time_ms, Some(0));
        assert_eq!(metrics.download_count, 3);
    }
}
