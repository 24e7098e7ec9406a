//! Report schedule repository.

use chrono::{DateTime, Utc};
use domain::models::ReportSchedule;
use domain::services::{ReportScheduleStore, StoreError};
use shared::pagination::PageRequest;
use sqlx::PgPool;
use uuid::Uuid;

use super::{db_err, to_i64};
use crate::entities::{ReportScheduleEntity, REPORT_SCHEDULE_COLUMNS};
use crate::metrics::QueryTimer;

/// PostgreSQL-backed [`ReportScheduleStore`].
#[derive(Clone)]
pub struct ReportScheduleRepository {
    pool: PgPool,
}

impl ReportScheduleRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_schedules(entities: Vec<ReportScheduleEntity>) -> Result<Vec<ReportSchedule>, StoreError> {
    entities.into_iter().map(ReportScheduleEntity::into_domain).collect()
}

#[async_trait::async_trait]
impl ReportScheduleStore for ReportScheduleRepository {
    async fn insert_schedule(&self, schedule: &ReportSchedule) -> Result<(), StoreError> {
        let timer = QueryTimer::new("insert_report_schedule");
        let sql = format!(
            "INSERT INTO report_schedules ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
            REPORT_SCHEDULE_COLUMNS
        );
        let result = sqlx::query(&sql)
            .bind(schedule.id)
            .bind(&schedule.name)
            .bind(schedule.frequency.as_str())
            .bind(schedule.template_id)
            .bind(schedule.parameter_overrides.to_json())
            .bind(schedule.format_override.map(|f| f.as_str()))
            .bind(schedule.start_date)
            .bind(schedule.end_date)
            .bind(schedule.run_time)
            .bind(schedule.timezone.to_string())
            .bind(schedule.status.as_str())
            .bind(schedule.last_run)
            .bind(schedule.next_run)
            .bind(to_i64(schedule.run_count))
            .bind(schedule.last_job_id)
            .bind(&schedule.last_error)
            .bind(schedule.created_by)
            .bind(schedule.created_at)
            .bind(schedule.updated_at)
            .execute(&self.pool)
            .await;
        timer.record();

        result.map_err(db_err)?;
        Ok(())
    }

    async fn find_schedule(&self, id: Uuid) -> Result<Option<ReportSchedule>, StoreError> {
        let timer = QueryTimer::new("find_report_schedule");
        let sql = format!("SELECT {} FROM report_schedules WHERE id = $1", REPORT_SCHEDULE_COLUMNS);
        let result = sqlx::query_as::<_, ReportScheduleEntity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();

        result.map_err(db_err)?.map(ReportScheduleEntity::into_domain).transpose()
    }

    async fn update_schedule(&self, schedule: &ReportSchedule) -> Result<(), StoreError> {
        let timer = QueryTimer::new("update_report_schedule");
        let result = sqlx::query(
            r#"
            UPDATE report_schedules
            SET status = $2, last_run = $3, next_run = $4, run_count = $5,
                last_job_id = $6, last_error = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.status.as_str())
        .bind(schedule.last_run)
        .bind(schedule.next_run)
        .bind(to_i64(schedule.run_count))
        .bind(schedule.last_job_id)
        .bind(&schedule.last_error)
        .bind(schedule.updated_at)
        .execute(&self.pool)
        .await;
        timer.record();

        result.map_err(db_err)?;
        Ok(())
    }

    async fn list_schedules(&self, page: PageRequest) -> Result<(Vec<ReportSchedule>, u64), StoreError> {
        let timer = QueryTimer::new("list_report_schedules");
        let sql = format!(
            "SELECT {} FROM report_schedules ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
            REPORT_SCHEDULE_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReportScheduleEntity>(&sql)
            .bind(to_i64(page.limit()))
            .bind(to_i64(page.offset()))
            .fetch_all(&self.pool)
            .await;
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM report_schedules")
            .fetch_one(&self.pool)
            .await;
        timer.record();

        let schedules = into_schedules(rows.map_err(db_err)?)?;
        Ok((schedules, total.map_err(db_err)?.max(0) as u64))
    }

    async fn find_due_schedules(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<ReportSchedule>, StoreError> {
        let timer = QueryTimer::new("find_due_report_schedules");
        let sql = format!(
            "SELECT {} FROM report_schedules \
             WHERE status = 'active' AND next_run <= $1 \
             ORDER BY next_run ASC LIMIT $2",
            REPORT_SCHEDULE_COLUMNS
        );
        let result = sqlx::query_as::<_, ReportScheduleEntity>(&sql)
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await;
        timer.record();

        into_schedules(result.map_err(db_err)?)
    }
}
