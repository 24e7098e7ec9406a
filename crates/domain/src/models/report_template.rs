//! Reusable report templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::report_job::{ExportFormat, ReportType};
use super::report_parameters::ReportParameters;

/// Saved report configuration. Templates are never removed automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub report_type: ReportType,
    pub default_parameters: ReportParameters,
    pub default_format: ExportFormat,
    pub usage_count: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub is_public: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ReportTemplate {
    pub fn new(
        name: impl Into<String>,
        report_type: ReportType,
        default_format: ExportFormat,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            report_type,
            default_parameters: ReportParameters::default(),
            default_format,
            usage_count: 0,
            last_used: None,
            is_public: false,
            created_by: None,
            created_at: now,
        }
    }

    pub fn record_use(&mut self, now: DateTime<Utc>) {
        self.usage_count += 1;
        self.last_used = Some(now);
    }

    /// Public templates are visible to everyone, private ones only to their
    /// creator.
    pub fn visible_to(&self, actor: Option<Uuid>) -> bool {
        self.is_public || (self.created_by.is_some() && self.created_by == actor)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateReportTemplateRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be 1-120 characters"))]
    pub name: String,
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,
    pub report_type: ReportType,
    #[serde(default)]
    pub default_parameters: Option<serde_json::Value>,
    pub default_format: ExportFormat,
    #[serde(default)]
    pub is_public: bool,
}
