//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

use std::fmt::Display;
use std::str::FromStr;

use domain::services::StoreError;

pub mod report_job;
pub mod report_metrics;
pub mod report_schedule;
pub mod report_share;
pub mod report_template;
pub mod volunteering;

pub use report_job::{ReportJobEntity, REPORT_JOB_COLUMNS};
pub use report_metrics::{ReportMetricsEntity, REPORT_METRICS_COLUMNS};
pub use report_schedule::{ReportScheduleEntity, REPORT_SCHEDULE_COLUMNS};
pub use report_share::{ReportShareEntity, REPORT_SHARE_COLUMNS};
pub use report_template::{ReportTemplateEntity, REPORT_TEMPLATE_COLUMNS};
pub use volunteering::{AssignmentEntity, EventEntity, RoleEntity, VenueEntity, VolunteerEntity};

/// Parses a text column holding an enum value.
pub(crate) fn parse_column<T>(column: &str, value: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse::<T>()
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", column, e)))
}

/// Counters are stored as signed integers.
pub(crate) fn non_negative(value: i64) -> u64 {
    value.max(0) as u64
}
