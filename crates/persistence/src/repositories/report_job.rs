//! Report job repository.
//!
//! The PENDING -> GENERATING transition is a single conditional UPDATE so two
//! workers racing for the same job cannot both win.

use chrono::{DateTime, Duration, Utc};
use domain::models::{ReportJob, ReportJobFilter};
use domain::services::{ExpiryCursor, ReportJobStore, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

use super::{db_err, to_i64};
use crate::entities::{ReportJobEntity, REPORT_JOB_COLUMNS};
use crate::metrics::QueryTimer;

/// PostgreSQL-backed [`ReportJobStore`].
#[derive(Clone)]
pub struct ReportJobRepository {
    pool: PgPool,
}

impl ReportJobRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_optional(
        &self,
        query_name: &'static str,
        sql: &str,
        id: Uuid,
    ) -> Result<Option<ReportJob>, StoreError> {
        let timer = QueryTimer::new(query_name);
        let result = sqlx::query_as::<_, ReportJobEntity>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();

        result.map_err(db_err)?.map(ReportJobEntity::into_domain).transpose()
    }
}

fn into_jobs(entities: Vec<ReportJobEntity>) -> Result<Vec<ReportJob>, StoreError> {
    entities.into_iter().map(ReportJobEntity::into_domain).collect()
}

#[async_trait::async_trait]
impl ReportJobStore for ReportJobRepository {
    async fn insert_job(&self, job: &ReportJob) -> Result<(), StoreError> {
        let timer = QueryTimer::new("insert_report_job");
        let sql = format!(
            "INSERT INTO report_jobs ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
            REPORT_JOB_COLUMNS
        );
        let result = sqlx::query(&sql)
            .bind(job.id)
            .bind(&job.title)
            .bind(job.report_type.as_str())
            .bind(job.parameters.to_json())
            .bind(job.format.as_str())
            .bind(job.status.as_str())
            .bind(job.progress_percentage as i16)
            .bind(&job.progress_message)
            .bind(job.total_records.map(to_i64))
            .bind(&job.artifact_location)
            .bind(job.artifact_size_bytes.map(to_i64))
            .bind(job.generation_duration_ms.map(to_i64))
            .bind(&job.error_message)
            .bind(job.template_id)
            .bind(job.schedule_id)
            .bind(job.created_by)
            .bind(job.created_at)
            .bind(job.started_at)
            .bind(job.completed_at)
            .bind(job.expires_at)
            .execute(&self.pool)
            .await;
        timer.record();

        result.map_err(db_err)?;
        Ok(())
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<ReportJob>, StoreError> {
        let sql = format!("SELECT {} FROM report_jobs WHERE id = $1", REPORT_JOB_COLUMNS);
        self.fetch_one_optional("find_report_job", &sql, id).await
    }

    async fn update_job(&self, job: &ReportJob) -> Result<(), StoreError> {
        let timer = QueryTimer::new("update_report_job");
        let result = sqlx::query(
            r#"
            UPDATE report_jobs
            SET title = $2, parameters = $3, status = $4, progress_percentage = $5,
                progress_message = $6, total_records = $7, artifact_location = $8,
                artifact_size_bytes = $9, generation_duration_ms = $10, error_message = $11,
                started_at = $12, completed_at = $13, expires_at = $14
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(&job.title)
        .bind(job.parameters.to_json())
        .bind(job.status.as_str())
        .bind(job.progress_percentage as i16)
        .bind(&job.progress_message)
        .bind(job.total_records.map(to_i64))
        .bind(&job.artifact_location)
        .bind(job.artifact_size_bytes.map(to_i64))
        .bind(job.generation_duration_ms.map(to_i64))
        .bind(&job.error_message)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.expires_at)
        .execute(&self.pool)
        .await;
        timer.record();

        if result.map_err(db_err)?.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("report job {} does not exist", job.id)));
        }
        Ok(())
    }

    async fn begin_generation(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<ReportJob>, StoreError> {
        let timer = QueryTimer::new("begin_report_generation");
        let sql = format!(
            "UPDATE report_jobs \
             SET status = 'generating', started_at = $2, completed_at = NULL, \
                 progress_percentage = 0, progress_message = 'Starting', error_message = NULL \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {}",
            REPORT_JOB_COLUMNS
        );
        let result = sqlx::query_as::<_, ReportJobEntity>(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await;
        timer.record();

        result.map_err(db_err)?.map(ReportJobEntity::into_domain).transpose()
    }

    async fn requeue_job(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<Option<ReportJob>, StoreError> {
        let timer = QueryTimer::new("requeue_report_job");
        let sql = format!(
            "UPDATE report_jobs \
             SET status = 'pending', progress_percentage = 0, progress_message = NULL, \
                 total_records = NULL, artifact_location = NULL, artifact_size_bytes = NULL, \
                 generation_duration_ms = NULL, error_message = NULL, \
                 started_at = NULL, completed_at = NULL, expires_at = $2 \
             WHERE id = $1 AND status IN ('failed', 'expired') \
             RETURNING {}",
            REPORT_JOB_COLUMNS
        );
        let result = sqlx::query_as::<_, ReportJobEntity>(&sql)
            .bind(id)
            .bind(now + retention)
            .fetch_optional(&self.pool)
            .await;
        timer.record();

        result.map_err(db_err)?.map(ReportJobEntity::into_domain).transpose()
    }

    async fn fail_stale_generations(
        &self,
        started_before: DateTime<Utc>,
        now: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<ReportJob>, StoreError> {
        let timer = QueryTimer::new("fail_stale_report_generations");
        let sql = format!(
            "UPDATE report_jobs \
             SET status = 'failed', progress_percentage = 0, progress_message = NULL, \
                 artifact_location = NULL, artifact_size_bytes = NULL, \
                 generation_duration_ms = (EXTRACT(EPOCH FROM ($2 - started_at)) * 1000)::BIGINT, \
                 error_message = $3, completed_at = $2 \
             WHERE status = 'generating' AND (started_at IS NULL OR started_at < $1) \
             RETURNING {}",
            REPORT_JOB_COLUMNS
        );
        let result = sqlx::query_as::<_, ReportJobEntity>(&sql)
            .bind(started_before)
            .bind(now)
            .bind(message)
            .fetch_all(&self.pool)
            .await;
        timer.record();

        into_jobs(result.map_err(db_err)?)
    }

    async fn record_progress(&self, id: Uuid, percent: u8, message: &str) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("record_report_progress");
        let result = sqlx::query(
            r#"
            UPDATE report_jobs
            SET progress_percentage = GREATEST(progress_percentage, $2),
                progress_message = $3
            WHERE id = $1 AND status = 'generating'
            "#,
        )
        .bind(id)
        .bind(percent.min(100) as i16)
        .bind(message)
        .execute(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(db_err)?.rows_affected() > 0)
    }

    async fn finish_generation(&self, job: &ReportJob) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("finish_report_generation");
        let result = sqlx::query(
            r#"
            UPDATE report_jobs
            SET status = $2, progress_percentage = $3, progress_message = $4,
                total_records = $5, artifact_location = $6, artifact_size_bytes = $7,
                generation_duration_ms = $8, error_message = $9, completed_at = $10
            WHERE id = $1 AND status = 'generating'
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.progress_percentage as i16)
        .bind(&job.progress_message)
        .bind(job.total_records.map(to_i64))
        .bind(&job.artifact_location)
        .bind(job.artifact_size_bytes.map(to_i64))
        .bind(job.generation_duration_ms.map(to_i64))
        .bind(&job.error_message)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(db_err)?.rows_affected() > 0)
    }

    async fn list_jobs(&self, filter: &ReportJobFilter) -> Result<(Vec<ReportJob>, u64), StoreError> {
        const WHERE: &str = "WHERE ($1::TEXT IS NULL OR status = $1) \
              AND ($2::TEXT IS NULL OR report_type = $2) \
              AND ($3::TEXT IS NULL OR format = $3) \
              AND ($4::UUID IS NULL OR created_by = $4) \
              AND ($5::TIMESTAMPTZ IS NULL OR created_at >= $5) \
              AND ($6::TIMESTAMPTZ IS NULL OR created_at < $6)";

        let status = filter.status.map(|s| s.as_str());
        let report_type = filter.report_type.map(|t| t.as_str());
        let format = filter.format.map(|f| f.as_str());

        let timer = QueryTimer::new("list_report_jobs");
        let sql = format!(
            "SELECT {} FROM report_jobs {} ORDER BY created_at DESC, id LIMIT $7 OFFSET $8",
            REPORT_JOB_COLUMNS, WHERE
        );
        let rows = sqlx::query_as::<_, ReportJobEntity>(&sql)
            .bind(status)
            .bind(report_type)
            .bind(format)
            .bind(filter.created_by)
            .bind(filter.created_after)
            .bind(filter.created_before)
            .bind(to_i64(filter.page.limit()))
            .bind(to_i64(filter.page.offset()))
            .fetch_all(&self.pool)
            .await;

        let count_sql = format!("SELECT COUNT(*) FROM report_jobs {}", WHERE);
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(status)
            .bind(report_type)
            .bind(format)
            .bind(filter.created_by)
            .bind(filter.created_after)
            .bind(filter.created_before)
            .fetch_one(&self.pool)
            .await;
        timer.record();

        let jobs = into_jobs(rows.map_err(db_err)?)?;
        Ok((jobs, total.map_err(db_err)?.max(0) as u64))
    }

    async fn find_pending_jobs(&self, limit: u32) -> Result<Vec<ReportJob>, StoreError> {
        let timer = QueryTimer::new("find_pending_report_jobs");
        let sql = format!(
            "SELECT {} FROM report_jobs WHERE status = 'pending' ORDER BY created_at ASC LIMIT $1",
            REPORT_JOB_COLUMNS
        );
        let result = sqlx::query_as::<_, ReportJobEntity>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await;
        timer.record();

        into_jobs(result.map_err(db_err)?)
    }

    async fn find_expired_jobs(
        &self,
        now: DateTime<Utc>,
        after: Option<ExpiryCursor>,
        limit: u32,
    ) -> Result<Vec<ReportJob>, StoreError> {
        let timer = QueryTimer::new("find_expired_report_jobs");
        let sql = format!(
            "SELECT {} FROM report_jobs \
             WHERE status = 'completed' AND expires_at < $1 \
               AND ($2::TIMESTAMPTZ IS NULL OR (expires_at, id) > ($2, $3::UUID)) \
             ORDER BY expires_at ASC, id ASC LIMIT $4",
            REPORT_JOB_COLUMNS
        );
        let result = sqlx::query_as::<_, ReportJobEntity>(&sql)
            .bind(now)
            .bind(after.map(|cursor| cursor.expires_at))
            .bind(after.map(|cursor| cursor.id))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await;
        timer.record();

        into_jobs(result.map_err(db_err)?)
    }

    async fn mark_expired(&self, id: Uuid) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("mark_report_job_expired");
        let result = sqlx::query(
            r#"
            UPDATE report_jobs
            SET status = 'expired', artifact_location = NULL, artifact_size_bytes = NULL
            WHERE id = $1 AND status = 'completed'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(db_err)?.rows_affected() > 0)
    }

    async fn delete_job(&self, id: Uuid) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("delete_report_job");
        // Metrics and shares go with the job through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM report_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await;
        timer.record();

        Ok(result.map_err(db_err)?.rows_affected() > 0)
    }
}
