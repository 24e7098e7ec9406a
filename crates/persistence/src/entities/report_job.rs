//! Report job entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{ReportJob, ReportParameters};
use domain::services::StoreError;
use sqlx::FromRow;
use uuid::Uuid;

use super::{non_negative, parse_column};

/// Column list shared by every `report_jobs` query.
pub const REPORT_JOB_COLUMNS: &str = "id, title, report_type, parameters, format, status, \
    progress_percentage, progress_message, total_records, artifact_location, artifact_size_bytes, \
    generation_duration_ms, error_message, template_id, schedule_id, created_by, created_at, \
    started_at, completed_at, expires_at";

/// Database row mapping for the report_jobs table.
#[derive(Debug, Clone, FromRow)]
pub struct ReportJobEntity {
    pub id: Uuid,
    pub title: String,
    pub report_type: String,
    /// Typed parameters stored as JSONB.
    pub parameters: serde_json::Value,
    pub format: String,
    pub status: String,
    pub progress_percentage: i16,
    pub progress_message: Option<String>,
    pub total_records: Option<i64>,
    /// Path inside the artifact storage backend.
    pub artifact_location: Option<String>,
    pub artifact_size_bytes: Option<i64>,
    pub generation_duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub template_id: Option<Uuid>,
    pub schedule_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl ReportJobEntity {
    /// Convert to domain model.
    pub fn into_domain(self) -> Result<ReportJob, StoreError> {
        let parameters: ReportParameters = serde_json::from_value(self.parameters)
            .map_err(|e| StoreError::Corrupt(format!("report_jobs.parameters: {}", e)))?;

        Ok(ReportJob {
            id: self.id,
            title: self.title,
            report_type: parse_column("report_jobs.report_type", &self.report_type)?,
            parameters,
            format: parse_column("report_jobs.format", &self.format)?,
            status: parse_column("report_jobs.status", &self.status)?,
            progress_percentage: self.progress_percentage.clamp(0, 100) as u8,
            progress_message: self.progress_message,
            total_records: self.total_records.map(non_negative),
            artifact_location: self.artifact_location,
            artifact_size_bytes: self.artifact_size_bytes.map(non_negative),
            generation_duration_ms: self.generation_duration_ms.map(non_negative),
            error_message: self.error_message,
            template_id: self.template_id,
            schedule_id: self.schedule_id,
            created_by: self.created_by,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            expires_at: self.expires_at,
        })
    }
}
