//! Report schedule entity (database row mapping).

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use domain::models::{ReportParameters, ReportSchedule};
use domain::services::StoreError;
use sqlx::FromRow;
use uuid::Uuid;

use super::{non_negative, parse_column};

pub const REPORT_SCHEDULE_COLUMNS: &str = "id, name, frequency, template_id, \
    parameter_overrides, format_override, start_date, end_date, run_time, timezone, status, \
    last_run, next_run, run_count, last_job_id, last_error, created_by, created_at, updated_at";

/// Database row mapping for the report_schedules table.
#[derive(Debug, Clone, FromRow)]
pub struct ReportScheduleEntity {
    pub id: Uuid,
    pub name: String,
    pub frequency: String,
    pub template_id: Uuid,
    pub parameter_overrides: serde_json::Value,
    pub format_override: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    /// Local time of day in `timezone`.
    pub run_time: NaiveTime,
    /// Fixed UTC offset, e.g. `UTC` or `+05:30`.
    pub timezone: String,
    pub status: String,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: i64,
    pub last_job_id: Option<Uuid>,
    pub last_error: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReportScheduleEntity {
    /// Convert to domain model.
    pub fn into_domain(self) -> Result<ReportSchedule, StoreError> {
        let parameter_overrides: ReportParameters = serde_json::from_value(self.parameter_overrides)
            .map_err(|e| StoreError::Corrupt(format!("report_schedules.parameter_overrides: {}", e)))?;
        let format_override = self
            .format_override
            .as_deref()
            .map(|f| parse_column("report_schedules.format_override", f))
            .transpose()?;

        Ok(ReportSchedule {
            id: self.id,
            name: self.name,
            frequency: parse_column("report_schedules.frequency", &self.frequency)?,
            template_id: self.template_id,
            parameter_overrides,
            format_override,
            start_date: self.start_date,
            end_date: self.end_date,
            run_time: self.run_time,
            timezone: parse_column("report_schedules.timezone", &self.timezone)?,
            status: parse_column("report_schedules.status", &self.status)?,
            last_run: self.last_run,
            next_run: self.next_run,
            run_count: non_negative(self.run_count),
            last_job_id: self.last_job_id,
            last_error: self.last_error,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
