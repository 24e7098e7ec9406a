//! Report engine services: generation, job lifecycle, sharing,
//! scheduling, retention and templates.

mod artifacts;
pub mod report_generation;
pub mod report_jobs;
pub mod report_retention;
pub mod report_schedules;
pub mod report_shares;
pub mod report_templates;

pub use report_generation::{
    GenerationOutcome, GenerationSettings, ProcessSummary, ReportGenerationService,
};
pub use report_jobs::{BulkItemResult, BulkOutcome, ReportDownload, ReportJobService};
pub use report_retention::{ReportRetentionService, SweepSummary};
pub use report_schedules::{ReportScheduleService, ScheduleExecution, ScheduleRunSummary};
pub use report_shares::ReportShareService;
pub use report_templates::ReportTemplateService;
