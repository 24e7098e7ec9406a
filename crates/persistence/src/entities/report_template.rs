//! Report template entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{ReportParameters, ReportTemplate};
use domain::services::StoreError;
use sqlx::FromRow;
use uuid::Uuid;

use super::{non_negative, parse_column};

pub const REPORT_TEMPLATE_COLUMNS: &str = "id, name, description, report_type, \
    default_parameters, default_format, usage_count, last_used, is_public, created_by, created_at";

/// Database row mapping for the report_templates table.
#[derive(Debug, Clone, FromRow)]
pub struct ReportTemplateEntity {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub report_type: String,
    pub default_parameters: serde_json::Value,
    pub default_format: String,
    pub usage_count: i64,
    pub last_used: Option<DateTime<Utc>>,
    pub is_public: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ReportTemplateEntity {
    /// Convert to domain model.
    pub fn into_domain(self) -> Result<ReportTemplate, StoreError> {
        let default_parameters: ReportParameters = serde_json::from_value(self.default_parameters)
            .map_err(|e| StoreError::Corrupt(format!("report_templates.default_parameters: {}", e)))?;

        Ok(ReportTemplate {
            id: self.id,
            name: self.name,
            description: self.description,
            report_type: parse_column("report_templates.report_type", &self.report_type)?,
            default_parameters,
            default_format: parse_column("report_templates.default_format", &self.default_format)?,
            usage_count: non_negative(self.usage_count),
            last_used: self.last_used,
            is_public: self.is_public,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{ExportFormat, ReportType};

    #[test]
    fn test_entity_to_domain() {
        let template = ReportTemplateEntity {
            id: Uuid::new_v4(),
            name: "Weekly staffing".to_string(),
            description: None,
            report_type: "event_performance".to_string(),
            default_parameters: serde_json::json!({}),
            default_format: "spreadsheet".to_string(),
            usage_count: 7,
            last_used: None,
            is_public: true,
            created_by: None,
            created_at: Utc::now(),
        }
        .into_domain()
        .unwrap();

        assert_eq!(template.report_type, ReportType::EventPerformance);
        assert_eq!(template.default_format, ExportFormat::Spreadsheet);
        assert_eq!(template.usage_count, 7);
    }
}
