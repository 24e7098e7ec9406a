//! Report job domain model and lifecycle state machine.
//!
//! ```text
//! PENDING -> GENERATING -> COMPLETED -> EXPIRED
//!                      \-> FAILED
//! FAILED | EXPIRED -> PENDING (regenerate)
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shared::pagination::PageRequest;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use super::report_parameters::ReportParameters;

/// Default lifetime of a generated report before the sweeper expires it.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Message recorded when a failure carries no description.
const UNKNOWN_FAILURE: &str = "Report generation failed without an error message";

/// Report types with a built-in adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    /// One row per event with headline staffing numbers.
    Summary,
    /// One row per volunteer with assignment totals.
    VolunteerDetail,
    /// One row per event role slot.
    EventPerformance,
    /// One row per venue.
    VenueUtilization,
    /// One row per assignment.
    RoleAssignment,
}

impl ReportType {
    pub const ALL: [ReportType; 5] = [
        ReportType::Summary,
        ReportType::VolunteerDetail,
        ReportType::EventPerformance,
        ReportType::VenueUtilization,
        ReportType::RoleAssignment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Summary => "summary",
            ReportType::VolunteerDetail => "volunteer_detail",
            ReportType::EventPerformance => "event_performance",
            ReportType::VenueUtilization => "venue_utilization",
            ReportType::RoleAssignment => "role_assignment",
        }
    }

    /// Human readable name used for default titles.
    pub fn label(&self) -> &'static str {
        match self {
            ReportType::Summary => "Event Summary",
            ReportType::VolunteerDetail => "Volunteer Detail",
            ReportType::EventPerformance => "Event Performance",
            ReportType::VenueUtilization => "Venue Utilization",
            ReportType::RoleAssignment => "Role Assignments",
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(ReportType::Summary),
            "volunteer_detail" => Ok(ReportType::VolunteerDetail),
            "event_performance" => Ok(ReportType::EventPerformance),
            "venue_utilization" => Ok(ReportType::VenueUtilization),
            "role_assignment" => Ok(ReportType::RoleAssignment),
            _ => Err(format!("Unknown report type: {}", s)),
        }
    }
}

/// Export formats understood by the strategy factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    DelimitedText,
    Spreadsheet,
    PaginatedDocument,
    StructuredData,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::DelimitedText,
        ExportFormat::Spreadsheet,
        ExportFormat::PaginatedDocument,
        ExportFormat::StructuredData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::DelimitedText => "delimited_text",
            ExportFormat::Spreadsheet => "spreadsheet",
            ExportFormat::PaginatedDocument => "paginated_document",
            ExportFormat::StructuredData => "structured_data",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::DelimitedText => "csv",
            ExportFormat::Spreadsheet => "xml",
            ExportFormat::PaginatedDocument => "pdf",
            ExportFormat::StructuredData => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::DelimitedText => "text/csv; charset=utf-8",
            ExportFormat::Spreadsheet => "application/vnd.ms-excel",
            ExportFormat::PaginatedDocument => "application/pdf",
            ExportFormat::StructuredData => "application/json",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    /// Accepts the canonical names plus the common file-type aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "delimited_text" | "csv" => Ok(ExportFormat::DelimitedText),
            "spreadsheet" | "excel" | "xls" | "xlsx" => Ok(ExportFormat::Spreadsheet),
            "paginated_document" | "pdf" => Ok(ExportFormat::PaginatedDocument),
            "structured_data" | "json" => Ok(ExportFormat::StructuredData),
            _ => Err(format!("Unknown export format: {}", s)),
        }
    }
}

/// Lifecycle status of a report job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Generating,
    Completed,
    Failed,
    Expired,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Generating => "generating",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
            ReportStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReportStatus::Completed | ReportStatus::Failed | ReportStatus::Expired
        )
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ReportStatus::Pending),
            "generating" => Ok(ReportStatus::Generating),
            "completed" => Ok(ReportStatus::Completed),
            "failed" => Ok(ReportStatus::Failed),
            "expired" => Ok(ReportStatus::Expired),
            _ => Err(format!("Unknown report status: {}", s)),
        }
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid report job transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: ReportStatus,
    pub to: ReportStatus,
}

/// Persisted unit of report generation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportJob {
    pub id: Uuid,
    pub title: String,
    pub report_type: ReportType,
    pub parameters: ReportParameters,
    pub format: ExportFormat,
    pub status: ReportStatus,
    pub progress_percentage: u8,
    pub progress_message: Option<String>,
    pub total_records: Option<u64>,
    pub artifact_location: Option<String>,
    pub artifact_size_bytes: Option<u64>,
    pub generation_duration_ms: Option<u64>,
    pub error_message: Option<String>,
    pub template_id: Option<Uuid>,
    pub schedule_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// Input for creating a report job.
#[derive(Debug, Clone)]
pub struct NewReportJob {
    pub report_type: ReportType,
    pub format: ExportFormat,
    pub parameters: ReportParameters,
    pub title: Option<String>,
    pub template_id: Option<Uuid>,
    pub schedule_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
}

impl NewReportJob {
    pub fn new(report_type: ReportType, format: ExportFormat) -> Self {
        Self {
            report_type,
            format,
            parameters: ReportParameters::default(),
            title: None,
            template_id: None,
            schedule_id: None,
            created_by: None,
        }
    }

    pub fn with_parameters(mut self, parameters: ReportParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn created_by(mut self, actor: Option<Uuid>) -> Self {
        self.created_by = actor;
        self
    }
}

impl ReportJob {
    /// Creates a PENDING job expiring `retention` after `now`.
    pub fn new(input: NewReportJob, now: DateTime<Utc>, retention: Duration) -> Self {
        let title = input
            .title
            .or_else(|| input.parameters.title.clone())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| input.report_type.label().to_string());

        Self {
            id: Uuid::new_v4(),
            title,
            report_type: input.report_type,
            parameters: input.parameters,
            format: input.format,
            status: ReportStatus::Pending,
            progress_percentage: 0,
            progress_message: None,
            total_records: None,
            artifact_location: None,
            artifact_size_bytes: None,
            generation_duration_ms: None,
            error_message: None,
            template_id: input.template_id,
            schedule_id: input.schedule_id,
            created_by: input.created_by,
            created_at: now,
            started_at: None,
            completed_at: None,
            expires_at: now + retention,
        }
    }

    fn transition(&self, expected: &[ReportStatus], to: ReportStatus) -> Result<(), TransitionError> {
        if expected.contains(&self.status) {
            Ok(())
        } else {
            Err(TransitionError {
                from: self.status,
                to,
            })
        }
    }

    /// PENDING -> GENERATING. Any other starting state is rejected, which is
    /// what keeps a job from being generated twice at once.
    pub fn start_generation(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(&[ReportStatus::Pending], ReportStatus::Generating)?;
        self.status = ReportStatus::Generating;
        self.started_at = Some(now);
        self.completed_at = None;
        self.progress_percentage = 0;
        self.progress_message = Some("Starting".to_string());
        self.error_message = None;
        Ok(())
    }

    /// Records progress for the running generation.
    ///
    /// Values are clamped to `0..=100`. A value lower than the current
    /// progress is ignored. Returns whether the stored progress changed.
    pub fn update_progress(
        &mut self,
        percent: i64,
        message: Option<String>,
    ) -> Result<bool, TransitionError> {
        self.transition(&[ReportStatus::Generating], ReportStatus::Generating)?;
        let percent = percent.clamp(0, 100) as u8;
        if percent < self.progress_percentage {
            return Ok(false);
        }
        let changed = percent > self.progress_percentage || message != self.progress_message;
        self.progress_percentage = percent;
        if message.is_some() {
            self.progress_message = message;
        }
        Ok(changed)
    }

    /// GENERATING -> COMPLETED.
    pub fn complete_generation(
        &mut self,
        artifact_location: impl Into<String>,
        artifact_size_bytes: u64,
        record_count: u64,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(&[ReportStatus::Generating], ReportStatus::Completed)?;
        self.status = ReportStatus::Completed;
        self.progress_percentage = 100;
        self.progress_message = Some("Completed".to_string());
        self.artifact_location = Some(artifact_location.into());
        self.artifact_size_bytes = Some(artifact_size_bytes);
        self.total_records = Some(record_count);
        self.completed_at = Some(now);
        self.generation_duration_ms = self.elapsed_ms(now);
        self.error_message = None;
        Ok(())
    }

    /// GENERATING -> FAILED. The error message is never left empty.
    pub fn fail_generation(
        &mut self,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(&[ReportStatus::Generating], ReportStatus::Failed)?;
        let message = message.into();
        self.status = ReportStatus::Failed;
        self.progress_percentage = 0;
        self.progress_message = None;
        self.artifact_location = None;
        self.artifact_size_bytes = None;
        self.completed_at = Some(now);
        self.generation_duration_ms = self.elapsed_ms(now);
        self.error_message = Some(if message.trim().is_empty() {
            UNKNOWN_FAILURE.to_string()
        } else {
            message
        });
        Ok(())
    }

    /// FAILED | EXPIRED -> PENDING. Clears the previous run's results and
    /// restarts the retention window.
    pub fn regenerate(&mut self, now: DateTime<Utc>, retention: Duration) -> Result<(), TransitionError> {
        self.transition(
            &[ReportStatus::Failed, ReportStatus::Expired],
            ReportStatus::Pending,
        )?;
        self.status = ReportStatus::Pending;
        self.progress_percentage = 0;
        self.progress_message = None;
        self.total_records = None;
        self.artifact_location = None;
        self.artifact_size_bytes = None;
        self.generation_duration_ms = None;
        self.error_message = None;
        self.started_at = None;
        self.completed_at = None;
        self.expires_at = now + retention;
        Ok(())
    }

    /// COMPLETED -> EXPIRED. Used by the retention sweeper once the artifact
    /// is gone.
    pub fn expire(&mut self) -> Result<(), TransitionError> {
        self.transition(&[ReportStatus::Completed], ReportStatus::Expired)?;
        self.status = ReportStatus::Expired;
        self.artifact_location = None;
        self.artifact_size_bytes = None;
        Ok(())
    }

    pub fn is_past_retention(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Whether the artifact can be served.
    pub fn is_downloadable(&self) -> bool {
        self.status == ReportStatus::Completed && self.artifact_location.is_some()
    }

    /// Suggested download file name.
    pub fn file_name(&self) -> String {
        let stem: String = self
            .title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        let stem = stem.trim_matches('_');
        let stem = if stem.is_empty() { self.report_type.as_str() } else { stem };
        format!(
            "{}_{}.{}",
            stem,
            self.created_at.format("%Y%m%d"),
            self.format.extension()
        )
    }

    fn elapsed_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        self.started_at
            .map(|started| (now - started).num_milliseconds().max(0) as u64)
    }
}

/// Filters for listing report jobs.
#[derive(Debug, Clone, Default)]
pub struct ReportJobFilter {
    pub status: Option<ReportStatus>,
    pub report_type: Option<ReportType>,
    pub format: Option<ExportFormat>,
    pub created_by: Option<Uuid>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub page: PageRequest,
}

impl ReportJobFilter {
    pub fn matches(&self, job: &ReportJob) -> bool {
        self.status.map_or(true, |s| job.status == s)
            && self.report_type.map_or(true, |t| job.report_type == t)
            && self.format.map_or(true, |f| job.format == f)
            && self.created_by.map_or(true, |c| job.created_by == Some(c))
            && self.created_after.map_or(true, |after| job.created_at >= after)
            && self.created_before.map_or(true, |before| job.created_at < before)
    }
}

/// Request payload for creating a report job.
///
/// Either `report_type` or `template_id` must be given. Values from the
/// request take precedence over the template defaults.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateReportJobRequest {
    pub report_type: Option<ReportType>,
    pub format: Option<ExportFormat>,
    pub template_id: Option<Uuid>,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,
}

/// Status view of a report job, exposing progress and the last error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportJobResponse {
    pub id: Uuid,
    pub title: String,
    pub report_type: ReportType,
    pub format: ExportFormat,
    pub status: ReportStatus,
    pub progress_percentage: u8,
    pub progress_message: Option<String>,
    pub total_records: Option<u64>,
    pub artifact_size_bytes: Option<u64>,
    pub generation_duration_ms: Option<u64>,
    pub error_message: Option<String>,
    pub parameters: serde_json::Value,
    pub template_id: Option<Uuid>,
    pub schedule_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub downloadable: bool,
}

impl From<ReportJob> for ReportJobResponse {
    fn from(job: ReportJob) -> Self {
        let downloadable = job.is_downloadable();
        Self {
            id: job.id,
            title: job.title,
            report_type: job.report_type,
            format: job.format,
            status: job.status,
            progress_percentage: job.progress_percentage,
            progress_message: job.progress_message,
            total_records: job.total_records,
            artifact_size_bytes: job.artifact_size_bytes,
            generation_duration_ms: job.generation_duration_ms,
            error_message: job.error_message,
            parameters: job.parameters.to_json(),
            template_id: job.template_id,
            schedule_id: job.schedule_id,
            created_by: job.created_by,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            expires_at: job.expires_at,
            downloadable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn pending_job() -> ReportJob {
        ReportJob::new(
            NewReportJob::new(ReportType::Summary, ExportFormat::DelimitedText),
            now(),
            Duration::days(DEFAULT_RETENTION_DAYS),
        )
    }

    fn generating_job() -> ReportJob {
        let mut job = pending_job();
        job.start_generation(now()).unwrap();
        job
    }

    #[test]
    fn test_new_job_defaults() {
        let job = pending_job();
        assert_eq!(job.status, ReportStatus::Pending);
        assert_eq!(job.progress_percentage, 0);
        assert_eq!(job.title, "Event Summary");
        assert_eq!(job.expires_at, now() + Duration::days(30));
        assert!(job.artifact_location.is_none());
    }

    #[test]
    fn test_title_falls_back_to_parameters() {
        let params = ReportParameters {
            title: Some("Spring Gala staffing".into()),
            ..Default::default()
        };
        let job = ReportJob::new(
            NewReportJob::new(ReportType::Summary, ExportFormat::StructuredData)
                .with_parameters(params),
            now(),
            Duration::days(1),
        );
        assert_eq!(job.title, "Spring Gala staffing");
    }

    #[test]
    fn test_start_generation_only_from_pending() {
        let mut job = pending_job();
        job.start_generation(now()).unwrap();
        assert_eq!(job.status, ReportStatus::Generating);
        assert_eq!(job.started_at, Some(now()));

        let err = job.start_generation(now()).unwrap_err();
        assert_eq!(err.from, ReportStatus::Generating);
        assert_eq!(err.to, ReportStatus::Generating);
    }

    #[test]
    fn test_update_progress_clamps_and_is_monotonic() {
        let mut job = generating_job();
        assert!(job.update_progress(40, None).unwrap());
        assert!(!job.update_progress(20, Some("older".into())).unwrap());
        assert_eq!(job.progress_percentage, 40);

        job.update_progress(250, None).unwrap();
        assert_eq!(job.progress_percentage, 100);

        job.update_progress(-5, None).unwrap();
        assert_eq!(job.progress_percentage, 100);
    }

    #[test]
    fn test_update_progress_requires_generating() {
        let mut job = pending_job();
        assert!(job.update_progress(10, None).is_err());
    }

    #[test]
    fn test_complete_generation() {
        let mut job = generating_job();
        let later = now() + Duration::seconds(3);
        job.complete_generation("summary/a.csv", 128, 12, later)
            .unwrap();

        assert_eq!(job.status, ReportStatus::Completed);
        assert_eq!(job.progress_percentage, 100);
        assert_eq!(job.total_records, Some(12));
        assert_eq!(job.artifact_size_bytes, Some(128));
        assert_eq!(job.generation_duration_ms, Some(3000));
        assert!(job.is_downloadable());
    }

    #[test]
    fn test_fail_generation_always_has_message() {
        let mut job = generating_job();
        job.fail_generation("   ", now()).unwrap();
        assert_eq!(job.status, ReportStatus::Failed);
        assert_eq!(job.progress_percentage, 0);
        assert_eq!(job.error_message.as_deref(), Some(UNKNOWN_FAILURE));
        assert!(job.artifact_location.is_none());
    }

    #[test]
    fn test_terminal_states_reject_generation_transitions() {
        let mut job = generating_job();
        job.complete_generation("x.csv", 10, 1, now()).unwrap();
        assert!(job.fail_generation("late", now()).is_err());
        assert!(job.start_generation(now()).is_err());
        assert!(job.update_progress(50, None).is_err());
        assert_eq!(job.status, ReportStatus::Completed);
    }

    #[test]
    fn test_regenerate_from_failed() {
        let mut job = generating_job();
        job.fail_generation("boom", now()).unwrap();

        let later = now() + Duration::days(2);
        job.regenerate(later, Duration::days(30)).unwrap();
        assert_eq!(job.status, ReportStatus::Pending);
        assert!(job.error_message.is_none());
        assert!(job.started_at.is_none());
        assert_eq!(job.expires_at, later + Duration::days(30));
    }

    #[test]
    fn test_regenerate_rejected_for_pending_and_completed() {
        let mut job = pending_job();
        assert!(job.regenerate(now(), Duration::days(1)).is_err());

        let mut job = generating_job();
        job.complete_generation("x.csv", 10, 1, now()).unwrap();
        assert!(job.regenerate(now(), Duration::days(1)).is_err());
    }

    #[test]
    fn test_expire_only_from_completed() {
        let mut job = generating_job();
        assert!(job.expire().is_err());

        job.complete_generation("x.csv", 10, 1, now()).unwrap();
        job.expire().unwrap();
        assert_eq!(job.status, ReportStatus::Expired);
        assert!(job.artifact_location.is_none());
        assert!(job.artifact_size_bytes.is_none());

        job.regenerate(now(), Duration::days(1)).unwrap();
        assert_eq!(job.status, ReportStatus::Pending);
    }

    #[test]
    fn test_format_parsing_accepts_aliases() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::DelimitedText);
        assert_eq!("PDF".parse::<ExportFormat>().unwrap(), ExportFormat::PaginatedDocument);
        assert_eq!("xlsx".parse::<ExportFormat>().unwrap(), ExportFormat::Spreadsheet);
        assert_eq!(
            "structured_data".parse::<ExportFormat>().unwrap(),
            ExportFormat::StructuredData
        );
        assert!("docx".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_enum_round_trip_strings() {
        for report_type in ReportType::ALL {
            assert_eq!(report_type.as_str().parse::<ReportType>().unwrap(), report_type);
        }
        for status in [
            ReportStatus::Pending,
            ReportStatus::Generating,
            ReportStatus::Completed,
            ReportStatus::Failed,
            ReportStatus::Expired,
        ] {
            assert_eq!(status.to_string().parse::<ReportStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_file_name() {
        let job = pending_job().clone();
        assert_eq!(job.file_name(), "event_summary_20260301.csv");
    }

    #[test]
    fn test_filter_matches() {
        let job = pending_job();
        let mut filter = ReportJobFilter::default();
        assert!(filter.matches(&job));

        filter.status = Some(ReportStatus::Completed);
        assert!(!filter.matches(&job));

        filter.status = Some(ReportStatus::Pending);
        filter.created_after = Some(now() + Duration::seconds(1));
        assert!(!filter.matches(&job));
    }
}
