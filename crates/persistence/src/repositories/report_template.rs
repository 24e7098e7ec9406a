//! Report template repository.

use chrono::{DateTime, Utc};
use domain::models::ReportTemplate;
use domain::services::{ReportTemplateStore, StoreError};
use shared::pagination::PageRequest;
use sqlx::PgPool;
use uuid::Uuid;

use super::{db_err, to_i64};
use crate::entities::{ReportTemplateEntity, REPORT_TEMPLATE_COLUMNS};
use crate::metrics::QueryTimer;

/// PostgreSQL-backed [`ReportTemplateStore`].
#[derive(Clone)]
pub struct ReportTemplateRepository {
    pool: PgPool,
}

impl ReportTemplateRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReportTemplateStore for ReportTemplateRepository {
    async fn insert_template(&self, template: &ReportTemplate) -> Result<(), StoreError> {
        let timer = QueryTimer::new("insert_report_template");
        let sql = format!(
            "INSERT INTO report_templates ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            REPORT_TEMPLATE_COLUMNS
        );
        let result = sqlx::query(&sql)
            .bind(template.id)
            .bind(&template.name)
            .bind(&template.description)
            .bind(template.report_type.as_str())
            .bind(template.default_parameters.to_json())
            .bind(template.default_format.as_str())
            .bind(to_i64(template.usage_count))
            .bind(template.last_used)
            .bind(template.is_public)
            .bind(template.created_by)
            .bind(template.created_at)
            .execute(&self.pool)
            .await;
        timer.record();

        result.map_err(db_err)?;
        Ok(())
    }

    async fn find_template(&self, id: Uuid) -> Result<Option<ReportTemplate>, StoreError> {
        let timer = QueryTimer::new("find_report_template");
        let sql = format!("SELECT {} FROM report_templates WHERE id = $1", REPORT_TEMPLATE_COLUMNS);
        let result = sqlx::query_as::<_, ReportTemplateEntity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();

        result.map_err(db_err)?.map(ReportTemplateEntity::into_domain).transpose()
    }

    async fn record_template_use(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let timer = QueryTimer::new("record_report_template_use");
        let result = sqlx::query(
            "UPDATE report_templates SET usage_count = usage_count + 1, last_used = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await;
        timer.record();

        result.map_err(db_err)?;
        Ok(())
    }

    async fn list_templates(
        &self,
        actor: Option<Uuid>,
        page: PageRequest,
    ) -> Result<(Vec<ReportTemplate>, u64), StoreError> {
        const WHERE: &str = "WHERE is_public OR ($1::UUID IS NOT NULL AND created_by = $1)";

        let timer = QueryTimer::new("list_report_templates");
        let sql = format!(
            "SELECT {} FROM report_templates {} ORDER BY name, id LIMIT $2 OFFSET $3",
            REPORT_TEMPLATE_COLUMNS, WHERE
        );
        let rows = sqlx::query_as::<_, ReportTemplateEntity>(&sql)
            .bind(actor)
            .bind(to_i64(page.limit()))
            .bind(to_i64(page.offset()))
            .fetch_all(&self.pool)
            .await;
        let count_sql = format!("SELECT COUNT(*) FROM report_templates {}", WHERE);
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(actor)
            .fetch_one(&self.pool)
            .await;
        timer.record();

        let templates = rows
            .map_err(db_err)?
            .into_iter()
            .map(ReportTemplateEntity::into_domain)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((templates, total.map_err(db_err)?.max(0) as u64))
    }
}
