//! Report metrics repository.

use chrono::{DateTime, Utc};
use domain::models::ReportMetrics;
use domain::services::{ReportMetricsStore, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

use super::{db_err, to_i64};
use crate::entities::{ReportMetricsEntity, REPORT_METRICS_COLUMNS};
use crate::metrics::QueryTimer;

/// PostgreSQL-backed [`ReportMetricsStore`].
#[derive(Clone)]
pub struct ReportMetricsRepository {
    pool: PgPool,
}

impl ReportMetricsRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReportMetricsStore for ReportMetricsRepository {
    async fn upsert_metrics(&self, metrics: &ReportMetrics) -> Result<(), StoreError> {
        let timer = QueryTimer::new("upsert_report_metrics");
        // Download counters are owned by record_download and never overwritten here.
        let sql = format!(
            "INSERT INTO report_metrics ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             ON CONFLICT (job_id) DO UPDATE SET \
                 query_time_ms = EXCLUDED.query_time_ms, \
                 processing_time_ms = EXCLUDED.processing_time_ms, \
                 export_time_ms = EXCLUDED.export_time_ms, \
                 memory_usage_mb = EXCLUDED.memory_usage_mb, \
                 cpu_time_ms = EXCLUDED.cpu_time_ms, \
                 rows_processed = EXCLUDED.rows_processed, \
                 columns_included = EXCLUDED.columns_included, \
                 data_completeness_percent = EXCLUDED.data_completeness_percent, \
                 error_count = EXCLUDED.error_count, \
                 warning_count = EXCLUDED.warning_count, \
                 updated_at = EXCLUDED.updated_at",
            REPORT_METRICS_COLUMNS
        );
        let result = sqlx::query(&sql)
            .bind(metrics.job_id)
            .bind(to_i64(metrics.query_time_ms))
            .bind(to_i64(metrics.processing_time_ms))
            .bind(to_i64(metrics.export_time_ms))
            .bind(metrics.memory_usage_mb)
            .bind(metrics.cpu_time_ms.map(to_i64))
            .bind(to_i64(metrics.rows_processed))
            .bind(metrics.columns_included as i32)
            .bind(metrics.data_completeness_percent)
            .bind(metrics.error_count as i32)
            .bind(metrics.warning_count as i32)
            .bind(to_i64(metrics.download_count))
            .bind(metrics.last_downloaded)
            .bind(metrics.created_at)
            .bind(metrics.updated_at)
            .execute(&self.pool)
            .await;
        timer.record();

        result.map_err(db_err)?;
        Ok(())
    }

    async fn find_metrics(&self, job_id: Uuid) -> Result<Option<ReportMetrics>, StoreError> {
        let timer = QueryTimer::new("find_report_metrics");
        let sql = format!("SELECT {} FROM report_metrics WHERE job_id = $1", REPORT_METRICS_COLUMNS);
        let result = sqlx::query_as::<_, ReportMetricsEntity>(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();

        Ok(result.map_err(db_err)?.map(ReportMetrics::from))
    }

    async fn record_download(&self, job_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let timer = QueryTimer::new("record_report_download");
        let result = sqlx::query(
            r#"
            UPDATE report_metrics
            SET download_count = download_count + 1, last_downloaded = $2, updated_at = $2
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .bind(now)
        .execute(&self.pool)
        .await;
        timer.record();

        result.map_err(db_err)?;
        Ok(())
    }
}
