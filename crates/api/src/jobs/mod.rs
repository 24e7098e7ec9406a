//! Background jobs and their scheduler.

mod report_generation;
mod report_retention;
mod report_schedule;
mod scheduler;

pub use report_generation::ReportGenerationJob;
pub use report_retention::ReportRetentionJob;
pub use report_schedule::ScheduleDispatchJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
