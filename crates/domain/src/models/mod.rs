//! Domain models for volunteer reports.

pub mod report_job;
pub mod report_metrics;
pub mod report_parameters;
pub mod report_schedule;
pub mod report_share;
pub mod report_template;
pub mod volunteering;

pub use report_job::{
    CreateReportJobRequest, ExportFormat, NewReportJob, ReportJob, ReportJobFilter,
    ReportJobResponse, ReportStatus, ReportType, TransitionError, DEFAULT_RETENTION_DAYS,
};
pub use report_metrics::{GenerationTimings, ReportMetrics};
pub use report_parameters::ReportParameters;
pub use report_schedule::{
    parse_run_time, CreateReportScheduleRequest, NewReportSchedule, ReportSchedule,
    ScheduleFrequency, ScheduleStatus, ScheduleTimezone,
};
pub use report_share::{
    CreateShareRequest, NewReportShare, ReportShare, ShareAccessGrant, ShareAction, ShareDenial,
    SharePermissions, ShareStatus, ShareType,
};
pub use report_template::{CreateReportTemplateRequest, ReportTemplate};
pub use volunteering::{
    AssignmentRecord, AssignmentStatus, EventRecord, EventStatus, RoleRecord, VenueRecord,
    VolunteerRecord,
};
