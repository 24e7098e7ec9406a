//! Report job lifecycle operations used by the HTTP layer.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use domain::models::{
    CreateReportJobRequest, NewReportJob, ReportJob, ReportJobFilter, ReportMetrics, ReportParameters,
    ReportStatus, TransitionError,
};
use domain::services::{ArtifactStorage, ReportStores};
use domain::ReportError;
use shared::pagination::PageInfo;

use super::artifacts::{read_artifact, remove_artifact};
use super::report_generation::ReportGenerationService;

/// Bytes of a generated artifact plus what a client needs to save it.
#[derive(Debug, Clone)]
pub struct ReportDownload {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub file_name: String,
}

/// Result for one id of a bulk operation.
#[derive(Debug, Clone, Serialize)]
pub struct BulkItemResult<T> {
    pub job_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-item results of a bulk operation. Individual failures never abort
/// the remaining items.
#[derive(Debug, Clone, Serialize)]
pub struct BulkOutcome<T> {
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<BulkItemResult<T>>,
}

impl<T> BulkOutcome<T> {
    pub(crate) fn new() -> Self {
        Self {
            succeeded: 0,
            failed: 0,
            items: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, job_id: Uuid, result: Result<T, ReportError>) {
        match result {
            Ok(value) => {
                self.succeeded += 1;
                self.items.push(BulkItemResult {
                    job_id,
                    success: true,
                    result: Some(value),
                    error: None,
                });
            }
            Err(e) => {
                self.failed += 1;
                self.items.push(BulkItemResult {
                    job_id,
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }
}

/// Rejects empty and oversized bulk requests.
pub(crate) fn check_bulk_size(ids: &[Uuid], max_items: usize) -> Result<(), ReportError> {
    if ids.is_empty() {
        return Err(ReportError::validation("job_ids must not be empty"));
    }
    if ids.len() > max_items {
        return Err(ReportError::validation(format!(
            "At most {} job ids are allowed per request",
            max_items
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ReportJobService {
    stores: ReportStores,
    storage: Arc<dyn ArtifactStorage>,
    generation: ReportGenerationService,
    retention: Duration,
    max_bulk_items: usize,
}

impl ReportJobService {
    pub fn new(
        stores: ReportStores,
        storage: Arc<dyn ArtifactStorage>,
        generation: ReportGenerationService,
        retention: Duration,
        max_bulk_items: usize,
    ) -> Self {
        Self {
            stores,
            storage,
            generation,
            retention,
            max_bulk_items,
        }
    }

    pub fn max_bulk_items(&self) -> usize {
        self.max_bulk_items
    }

    /// Creates a PENDING job from a request, optionally based on a template.
    ///
    /// Request values override template defaults. Format, report type and
    /// parameters are validated here so that a job never enters the queue
    /// in a shape the worker cannot generate.
    pub async fn create(
        &self,
        request: CreateReportJobRequest,
        actor: Option<Uuid>,
    ) -> Result<ReportJob, ReportError> {
        request.validate()?;

        let overrides = match &request.parameters {
            Some(value) => Some(ReportParameters::from_json(value)?),
            None => None,
        };

        let template = match request.template_id {
            Some(template_id) => {
                let template = self
                    .stores
                    .templates
                    .find_template(template_id)
                    .await?
                    .filter(|t| t.visible_to(actor))
                    .ok_or_else(|| ReportError::not_found(format!("Report template {}", template_id)))?;
                Some(template)
            }
            None => None,
        };

        let mut input = match &template {
            Some(template) => {
                if let Some(report_type) = request.report_type {
                    if report_type != template.report_type {
                        return Err(ReportError::validation(format!(
                            "report_type {} does not match template report type {}",
                            report_type, template.report_type
                        )));
                    }
                }
                let parameters = match &overrides {
                    Some(overrides) => template.default_parameters.merged_with(overrides),
                    None => template.default_parameters.clone(),
                };
                let mut input = NewReportJob::new(
                    template.report_type,
                    request.format.unwrap_or(template.default_format),
                )
                .with_parameters(parameters);
                input.template_id = Some(template.id);
                input
            }
            None => {
                let report_type = request
                    .report_type
                    .ok_or_else(|| ReportError::validation("report_type or template_id is required"))?;
                let format = request
                    .format
                    .ok_or_else(|| ReportError::validation("format is required without a template"))?;
                NewReportJob::new(report_type, format).with_parameters(overrides.unwrap_or_default())
            }
        };

        if let Some(value) = &request.parameters {
            let ignored = ReportParameters::ignored_keys(value, input.report_type);
            if !ignored.is_empty() {
                debug!(report_type = %input.report_type, ignored = ?ignored, "Ignoring unrecognized report parameters");
            }
        }

        input.title = request.title;
        let now = Utc::now();
        let job = ReportJob::new(input.created_by(actor), now, self.retention);
        self.generation.check_generatable(&job)?;

        self.stores.jobs.insert_job(&job).await?;
        if let Some(template) = &template {
            self.stores.templates.record_template_use(template.id, now).await?;
        }

        info!(
            job_id = %job.id,
            report_type = %job.report_type,
            format = %job.format,
            template_id = ?job.template_id,
            "Report job queued"
        );
        Ok(job)
    }

    pub async fn get(&self, job_id: Uuid) -> Result<ReportJob, ReportError> {
        self.stores
            .jobs
            .find_job(job_id)
            .await?
            .ok_or_else(|| ReportError::not_found(format!("Report job {}", job_id)))
    }

    pub async fn metrics(&self, job_id: Uuid) -> Result<ReportMetrics, ReportError> {
        self.get(job_id).await?;
        self.stores
            .metrics
            .find_metrics(job_id)
            .await?
            .ok_or_else(|| ReportError::not_found(format!("Metrics for report job {}", job_id)))
    }

    pub async fn list(&self, filter: &ReportJobFilter) -> Result<(Vec<ReportJob>, PageInfo), ReportError> {
        let (jobs, total) = self.stores.jobs.list_jobs(filter).await?;
        Ok((jobs, PageInfo::new(filter.page, total)))
    }

    /// Reads the artifact of a COMPLETED job and counts the download.
    pub async fn download(&self, job_id: Uuid) -> Result<ReportDownload, ReportError> {
        let job = self.get(job_id).await?;
        let location = match (&job.artifact_location, job.is_downloadable()) {
            (Some(location), true) => location.clone(),
            _ => {
                return Err(ReportError::validation(format!(
                    "Report job {} has no downloadable artifact (status: {})",
                    job_id, job.status
                )))
            }
        };

        let bytes = read_artifact(&self.storage, &location).await?;
        if let Err(e) = self.stores.metrics.record_download(job_id, Utc::now()).await {
            warn!(job_id = %job_id, error = %e, "Failed to count report download");
        }

        Ok(ReportDownload {
            bytes,
            content_type: job.format.content_type(),
            file_name: job.file_name(),
        })
    }

    /// Puts a FAILED or EXPIRED job back into the queue.
    ///
    /// The state change is a single conditional store update, so of two
    /// concurrent calls at most one requeues the job.
    pub async fn regenerate(&self, job_id: Uuid) -> Result<ReportJob, ReportError> {
        let current = self.get(job_id).await?;
        let now = Utc::now();
        let mut preview = current.clone();
        preview.regenerate(now, self.retention)?;
        self.generation.check_generatable(&preview)?;

        let Some(job) = self.stores.jobs.requeue_job(job_id, now, self.retention).await? else {
            let latest = self.get(job_id).await?;
            return Err(TransitionError {
                from: latest.status,
                to: ReportStatus::Pending,
            }
            .into());
        };

        if let Some(location) = &current.artifact_location {
            if let Err(e) = remove_artifact(&self.storage, location).await {
                warn!(job_id = %job_id, error = %e, "Failed to delete previous report artifact");
            }
        }

        info!(job_id = %job.id, report_type = %job.report_type, "Report job queued for regeneration");
        Ok(job)
    }

    /// Deletes a job with its artifact, metrics and shares.
    pub async fn delete(&self, job_id: Uuid) -> Result<(), ReportError> {
        let job = self.get(job_id).await?;
        if job.status == ReportStatus::Generating {
            return Err(ReportError::validation(format!(
                "Report job {} is generating and cannot be deleted",
                job_id
            )));
        }

        if let Some(location) = &job.artifact_location {
            remove_artifact(&self.storage, location).await?;
        }
        if !self.stores.jobs.delete_job(job_id).await? {
            return Err(ReportError::not_found(format!("Report job {}", job_id)));
        }

        info!(job_id = %job_id, "Report job deleted");
        Ok(())
    }

    pub async fn bulk_delete(&self, job_ids: &[Uuid]) -> Result<BulkOutcome<()>, ReportError> {
        check_bulk_size(job_ids, self.max_bulk_items)?;
        let mut outcome = BulkOutcome::new();
        for &job_id in job_ids {
            outcome.push(job_id, self.delete(job_id).await);
        }
        Ok(outcome)
    }

    pub async fn bulk_regenerate(&self, job_ids: &[Uuid]) -> Result<BulkOutcome<ReportStatus>, ReportError> {
        check_bulk_size(job_ids, self.max_bulk_items)?;
        let mut outcome = BulkOutcome::new();
        for &job_id in job_ids {
            let result = self.regenerate(job_id).await.map(|job| job.status);
            outcome.push(job_id, result);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::report_generation::GenerationSettings;
    use domain::models::{ExportFormat, ReportTemplate, ReportType};
    use domain::services::{AdapterRegistry, InMemoryDataSource, StrategyFactory};
    use persistence::{InMemoryArtifactStorage, InMemoryReportStore};
    use serde_json::json;

    struct Fixture {
        service: ReportJobService,
        generation: ReportGenerationService,
        stores: ReportStores,
        storage: InMemoryArtifactStorage,
    }

    fn fixture() -> Fixture {
        let stores = ReportStores::from_single(Arc::new(InMemoryReportStore::new()));
        let storage = InMemoryArtifactStorage::new();
        let generation = ReportGenerationService::new(
            stores.clone(),
            Arc::new(storage.clone()),
            AdapterRegistry::with_defaults(Arc::new(InMemoryDataSource::new())),
            StrategyFactory::with_defaults(),
            GenerationSettings::default(),
        );
        let service = ReportJobService::new(
            stores.clone(),
            Arc::new(storage.clone()),
            generation.clone(),
            Duration::days(30),
            3,
        );
        Fixture {
            service,
            generation,
            stores,
            storage,
        }
    }

    fn request(report_type: Option<ReportType>, format: Option<ExportFormat>) -> CreateReportJobRequest {
        CreateReportJobRequest {
            report_type,
            format,
            template_id: None,
            parameters: None,
            title: None,
        }
    }

    #[tokio::test]
    async fn test_create_queues_pending_job() {
        let f = fixture();
        let actor = Some(Uuid::new_v4());
        let mut req = request(Some(ReportType::VolunteerDetail), Some(ExportFormat::DelimitedText));
        req.parameters = Some(json!({"date_from": "2026-01-01", "unknown": 1}));

        let job = f.service.create(req, actor).await.unwrap();
        assert_eq!(job.status, ReportStatus::Pending);
        assert_eq!(job.created_by, actor);
        assert_eq!(job.title, ReportType::VolunteerDetail.label());
        assert!(f.stores.jobs.find_job(job.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let f = fixture();
        let err = f.service.create(request(None, Some(ExportFormat::DelimitedText)), None).await;
        assert!(matches!(err, Err(ReportError::Validation(_))));

        let mut req = request(Some(ReportType::Summary), Some(ExportFormat::DelimitedText));
        req.parameters = Some(json!({"date_from": "2026-02-01", "date_to": "2026-01-01"}));
        assert!(matches!(f.service.create(req, None).await, Err(ReportError::Validation(_))));

        let (jobs, page) = f.service.list(&ReportJobFilter::default()).await.unwrap();
        assert!(jobs.is_empty());
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_create_from_template_merges_and_counts_use() {
        let f = fixture();
        let owner = Some(Uuid::new_v4());
        let mut template =
            ReportTemplate::new("Weekly staffing", ReportType::Summary, ExportFormat::StructuredData, Utc::now());
        template.created_by = owner;
        template.default_parameters.include_inactive = Some(true);
        f.stores.templates.insert_template(&template).await.unwrap();

        let mut req = request(None, None);
        req.template_id = Some(template.id);
        req.parameters = Some(json!({"date_from": "2026-03-01"}));
        let job = f.service.create(req.clone(), owner).await.unwrap();

        assert_eq!(job.format, ExportFormat::StructuredData);
        assert_eq!(job.template_id, Some(template.id));
        assert_eq!(job.parameters.include_inactive, Some(true));
        assert!(job.parameters.date_from.is_some());

        let stored = f.stores.templates.find_template(template.id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 1);

        let other = f.service.create(req, Some(Uuid::new_v4())).await;
        assert!(matches!(other, Err(ReportError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_download_requires_completed_job() {
        let f = fixture();
        let job = f
            .service
            .create(request(Some(ReportType::Summary), Some(ExportFormat::DelimitedText)), None)
            .await
            .unwrap();
        assert!(matches!(f.service.download(job.id).await, Err(ReportError::Validation(_))));

        f.generation.generate(job.id).await.unwrap();
        let download = f.service.download(job.id).await.unwrap();
        assert!(download.content_type.starts_with("text/csv"));
        assert!(download.file_name.ends_with(".csv"));
        assert!(!download.bytes.is_empty());

        let metrics = f.service.metrics(job.id).await.unwrap();
        assert_eq!(metrics.download_count, 1);
    }

    #[tokio::test]
    async fn test_delete_removes_artifact_and_job() {
        let f = fixture();
        let job = f
            .service
            .create(request(Some(ReportType::Summary), Some(ExportFormat::DelimitedText)), None)
            .await
            .unwrap();
        f.generation.generate(job.id).await.unwrap();
        assert_eq!(f.storage.paths().len(), 1);

        f.service.delete(job.id).await.unwrap();
        assert!(f.storage.paths().is_empty());
        assert!(matches!(f.service.get(job.id).await, Err(ReportError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_regenerate_only_from_failed_or_expired() {
        let f = fixture();
        let job = f
            .service
            .create(request(Some(ReportType::Summary), Some(ExportFormat::DelimitedText)), None)
            .await
            .unwrap();
        assert!(matches!(
            f.service.regenerate(job.id).await,
            Err(ReportError::InvalidTransition(_))
        ));

        let mut failed = f.service.get(job.id).await.unwrap();
        failed.start_generation(Utc::now()).unwrap();
        failed.fail_generation("source offline".to_string(), Utc::now()).unwrap();
        f.stores.jobs.update_job(&failed).await.unwrap();

        let job = f.service.regenerate(job.id).await.unwrap();
        assert_eq!(job.status, ReportStatus::Pending);
        assert!(job.error_message.is_none());
    }

    #[tokio::test]
    async fn test_stale_regenerate_cannot_reopen_running_job() {
        let f = fixture();
        let job = f
            .service
            .create(request(Some(ReportType::Summary), Some(ExportFormat::DelimitedText)), None)
            .await
            .unwrap();
        let mut failed = f.service.get(job.id).await.unwrap();
        failed.start_generation(Utc::now()).unwrap();
        failed.fail_generation("source offline".to_string(), Utc::now()).unwrap();
        f.stores.jobs.update_job(&failed).await.unwrap();

        f.service.regenerate(job.id).await.unwrap();
        let running = f.stores.jobs.begin_generation(job.id, Utc::now()).await.unwrap();
        assert!(running.is_some());

        assert!(f
            .stores
            .jobs
            .requeue_job(job.id, Utc::now(), Duration::days(30))
            .await
            .unwrap()
            .is_none());
        let err = f.service.regenerate(job.id).await.unwrap_err();
        assert!(matches!(
            err,
            ReportError::InvalidTransition(TransitionError {
                from: ReportStatus::Generating,
                ..
            })
        ));
        let stored = f.service.get(job.id).await.unwrap();
        assert_eq!(stored.status, ReportStatus::Generating);
        assert!(f.stores.jobs.begin_generation(job.id, Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_regenerate_requeues_once() {
        let f = fixture();
        let job = f
            .service
            .create(request(Some(ReportType::Summary), Some(ExportFormat::DelimitedText)), None)
            .await
            .unwrap();
        let mut failed = f.service.get(job.id).await.unwrap();
        failed.start_generation(Utc::now()).unwrap();
        failed.fail_generation("source offline".to_string(), Utc::now()).unwrap();
        f.stores.jobs.update_job(&failed).await.unwrap();

        let job_id = job.id;
        let mut handles = Vec::new();
        for _ in 0..6 {
            let service = f.service.clone();
            handles.push(tokio::spawn(async move { service.regenerate(job_id).await }));
        }
        let mut requeued = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                requeued += 1;
            }
        }
        assert_eq!(requeued, 1);
    }

    #[tokio::test]
    async fn test_bulk_delete_reports_each_item() {
        let f = fixture();
        let job = f
            .service
            .create(request(Some(ReportType::Summary), Some(ExportFormat::DelimitedText)), None)
            .await
            .unwrap();
        let missing = Uuid::new_v4();

        let outcome = f.service.bulk_delete(&[job.id, missing]).await.unwrap();
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed, 1);
        assert!(outcome.items[1].error.as_deref().unwrap().starts_with("Not found: "));

        let too_many: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        assert!(matches!(
            f.service.bulk_delete(&too_many).await,
            Err(ReportError::Validation(_))
        ));
        assert!(matches!(f.service.bulk_delete(&[]).await, Err(ReportError::Validation(_))));
    }
}
