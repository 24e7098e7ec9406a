//! Report templates.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use domain::models::{CreateReportTemplateRequest, ReportParameters, ReportTemplate};
use domain::services::{ReportStores, StrategyFactory};
use domain::ReportError;
use shared::pagination::{PageInfo, PageRequest};

#[derive(Clone)]
pub struct ReportTemplateService {
    stores: ReportStores,
    strategies: StrategyFactory,
}

impl ReportTemplateService {
    pub fn new(stores: ReportStores, strategies: StrategyFactory) -> Self {
        Self { stores, strategies }
    }

    pub async fn create(
        &self,
        request: CreateReportTemplateRequest,
        actor: Option<Uuid>,
    ) -> Result<ReportTemplate, ReportError> {
        request.validate()?;
        self.strategies.strategy_for(request.default_format)?;
        let default_parameters = match &request.default_parameters {
            Some(value) => ReportParameters::from_json(value)?,
            None => ReportParameters::default(),
        };

        let mut template = ReportTemplate::new(
            request.name,
            request.report_type,
            request.default_format,
            Utc::now(),
        );
        template.description = request.description;
        template.default_parameters = default_parameters;
        template.is_public = request.is_public;
        template.created_by = actor;
        self.stores.templates.insert_template(&template).await?;

        info!(
            template_id = %template.id,
            report_type = %template.report_type,
            is_public = template.is_public,
            "Report template created"
        );
        Ok(template)
    }

    /// Private templates are only visible to their creator.
    pub async fn get(&self, template_id: Uuid, actor: Option<Uuid>) -> Result<ReportTemplate, ReportError> {
        self.stores
            .templates
            .find_template(template_id)
            .await?
            .filter(|t| t.visible_to(actor))
            .ok_or_else(|| ReportError::not_found(format!("Report template {}", template_id)))
    }

    pub async fn list(
        &self,
        actor: Option<Uuid>,
        page: PageRequest,
    ) -> Result<(Vec<ReportTemplate>, PageInfo), ReportError> {
        let (templates, total) = self.stores.templates.list_templates(actor, page).await?;
        Ok((templates, PageInfo::new(page, total)))
    }
}
