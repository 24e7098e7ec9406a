//! Report generation coordinator.
//!
//! Drives one job through PENDING -> GENERATING -> COMPLETED | FAILED.
//! Rows are streamed through the export strategy on a blocking worker
//! thread; progress checkpoints are coalesced through a watch channel and
//! persisted from the async side.

use chrono::{DateTime, Utc};
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use domain::models::{GenerationTimings, ReportJob, ReportMetrics, ReportStatus};
use domain::services::{
    artifact_path, AdapterRegistry, ArtifactStorage, ExportContext, ExportOutcome, ExportStrategy,
    ProgressUpdate, ReportAdapter, ReportStores, StrategyFactory,
};
use domain::ReportError;

use super::artifacts::remove_artifact;
use crate::config::ReportsConfig;
use crate::middleware::metrics::{record_generation, record_rows_exported};

/// Settings the coordinator takes from `[reports]`.
#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub progress_interval_rows: u64,
    pub document_row_limit: u64,
    pub worker_concurrency: usize,
    /// How long a job may stay GENERATING before it is failed as stale.
    pub generation_timeout: Duration,
}

impl From<&ReportsConfig> for GenerationSettings {
    fn from(config: &ReportsConfig) -> Self {
        Self {
            progress_interval_rows: config.progress_interval_rows,
            document_row_limit: config.document_row_limit,
            worker_concurrency: config.worker_concurrency,
            generation_timeout: Duration::from_secs(config.generation_timeout_secs),
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from(&ReportsConfig::default())
    }
}

/// Result of a `generate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed,
    Failed,
    /// The job was not PENDING; nothing was changed.
    Skipped,
}

impl GenerationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationOutcome::Completed => "completed",
            GenerationOutcome::Failed => "failed",
            GenerationOutcome::Skipped => "skipped",
        }
    }
}

/// Counts of one `process_pending` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub completed: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Stale GENERATING jobs failed before the pass.
    pub recovered: u32,
}

impl ProcessSummary {
    pub fn processed(&self) -> u32 {
        self.completed + self.failed
    }
}

/// What the blocking export worker hands back.
struct ExportRun {
    outcome: ExportOutcome,
    size_bytes: u64,
    elapsed: Duration,
}

#[derive(Clone)]
pub struct ReportGenerationService {
    stores: ReportStores,
    storage: Arc<dyn ArtifactStorage>,
    adapters: Arc<AdapterRegistry>,
    strategies: Arc<StrategyFactory>,
    settings: GenerationSettings,
}

impl ReportGenerationService {
    pub fn new(
        stores: ReportStores,
        storage: Arc<dyn ArtifactStorage>,
        adapters: AdapterRegistry,
        strategies: StrategyFactory,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            stores,
            storage,
            adapters: Arc::new(adapters),
            strategies: Arc::new(strategies),
            settings,
        }
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub fn strategies(&self) -> &StrategyFactory {
        &self.strategies
    }

    /// Checks that a job with this shape could be generated: the export
    /// format has a strategy, the report type an adapter, and the
    /// parameters are valid.
    pub fn check_generatable(&self, job: &ReportJob) -> Result<(), ReportError> {
        self.strategies.strategy_for(job.format)?;
        self.adapters.get(job.report_type)?;
        job.parameters.validate()
    }

    /// Generates the artifact of one job.
    ///
    /// Configuration and validation problems are returned as errors before
    /// any state change. A job that is not PENDING is skipped. Failures
    /// after the job entered GENERATING are recorded on the job and yield
    /// [`GenerationOutcome::Failed`].
    pub async fn generate(&self, job_id: Uuid) -> Result<GenerationOutcome, ReportError> {
        let job = self
            .stores
            .jobs
            .find_job(job_id)
            .await?
            .ok_or_else(|| ReportError::not_found(format!("Report job {}", job_id)))?;

        if job.status != ReportStatus::Pending {
            debug!(job_id = %job_id, status = %job.status, "Report job is not pending, skipping");
            return Ok(GenerationOutcome::Skipped);
        }

        let strategy = self.strategies.strategy_for(job.format)?;
        let adapter = self.adapters.get(job.report_type)?;
        job.parameters.validate()?;

        let started_at = Utc::now();
        let Some(job) = self.stores.jobs.begin_generation(job_id, started_at).await? else {
            debug!(job_id = %job_id, "Report job claimed by another worker, skipping");
            return Ok(GenerationOutcome::Skipped);
        };

        info!(
            job_id = %job.id,
            report_type = %job.report_type,
            format = %job.format,
            "Report generation started"
        );

        let mut metrics = match self.stores.metrics.find_metrics(job.id).await {
            Ok(Some(existing)) => existing,
            Ok(None) => ReportMetrics::new(job.id, started_at),
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Failed to load report metrics");
                ReportMetrics::new(job.id, started_at)
            }
        };
        if let Err(e) = self.stores.metrics.upsert_metrics(&metrics).await {
            warn!(job_id = %job.id, error = %e, "Failed to create report metrics");
        }

        let format = job.format;
        let clock = Instant::now();
        let result = self.export(&job, strategy, adapter).await;

        let outcome = match result {
            Ok(run) => self.complete(job, &mut metrics, run, started_at).await?,
            Err(e) => self.fail(job, &mut metrics, e.to_string()).await?,
        };

        record_generation(format.as_str(), outcome.as_str(), clock.elapsed().as_secs_f64());
        Ok(outcome)
    }

    async fn export(
        &self,
        job: &ReportJob,
        strategy: Arc<dyn ExportStrategy>,
        adapter: Arc<dyn ReportAdapter>,
    ) -> Result<ExportRun, ReportError> {
        let path = artifact_path(job);
        let mut ctx = ExportContext::new(job.id, job.title.clone(), job.report_type, job.parameters.clone());
        ctx.progress_interval_rows = self.settings.progress_interval_rows;
        ctx.document_row_limit = self.settings.document_row_limit;

        let (progress_tx, progress_rx) = watch::channel(None::<ProgressUpdate>);
        let pump = tokio::spawn(persist_progress(self.stores.clone(), job.id, progress_rx));

        let storage = Arc::clone(&self.storage);
        let worker = tokio::task::spawn_blocking(move || -> Result<ExportRun, ReportError> {
            let started = Instant::now();
            let mut writer = storage.create(&path)?;
            let outcome = {
                let mut buffered = BufWriter::new(&mut writer);
                let outcome = strategy
                    .export(adapter.as_ref(), &ctx, &mut buffered, &mut |update| {
                        progress_tx.send_replace(Some(update));
                    })
                    .map_err(|e| ReportError::Generation(e.to_string()))?;
                buffered
                    .flush()
                    .map_err(|e| ReportError::Generation(format!("write failed: {}", e)))?;
                outcome
            };
            let size_bytes = writer.commit()?;
            Ok(ExportRun {
                outcome,
                size_bytes,
                elapsed: started.elapsed(),
            })
        });

        let result = match worker.await {
            Ok(result) => result,
            Err(e) => Err(ReportError::Generation(format!("export worker stopped: {}", e))),
        };

        if let Err(e) = pump.await {
            warn!(job_id = %job.id, error = %e, "Progress writer stopped unexpectedly");
        }
        result
    }

    async fn complete(
        &self,
        mut job: ReportJob,
        metrics: &mut ReportMetrics,
        run: ExportRun,
        started_at: DateTime<Utc>,
    ) -> Result<GenerationOutcome, ReportError> {
        let now = Utc::now();
        let location = artifact_path(&job);
        let outcome = &run.outcome;
        let generating = job.clone();

        job.complete_generation(location.clone(), run.size_bytes, outcome.rows_written, now)?;
        match self.stores.jobs.finish_generation(&job).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(job_id = %job.id, "Report job left GENERATING before completion, discarding artifact");
                self.discard_artifact(job.id, &location).await;
                return Ok(GenerationOutcome::Skipped);
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to record report completion, discarding artifact");
                self.discard_artifact(job.id, &location).await;
                return self
                    .fail(generating, metrics, format!("Failed to record report completion: {}", e))
                    .await;
            }
        }

        let query_ms = outcome.query_time.as_millis() as u64;
        let processing_ms = outcome.processing_time.as_millis() as u64;
        metrics.record_timings(
            GenerationTimings {
                query_ms,
                processing_ms,
                export_ms: (run.elapsed.as_millis() as u64).saturating_sub(query_ms + processing_ms),
            },
            now,
        );
        metrics.record_rows(outcome.rows_written, outcome.columns, outcome.completeness(), now);
        metrics.add_warnings(outcome.warnings(), now);
        metrics.memory_usage_mb = peak_memory_mb();
        if let Err(e) = self.stores.metrics.upsert_metrics(metrics).await {
            warn!(job_id = %job.id, error = %e, "Failed to store report metrics");
        }

        record_rows_exported(outcome.rows_written);
        info!(
            job_id = %job.id,
            report_type = %job.report_type,
            rows = outcome.rows_written,
            size_bytes = run.size_bytes,
            truncated = outcome.truncated,
            elapsed_ms = (now - started_at).num_milliseconds(),
            "Report generation completed"
        );
        Ok(GenerationOutcome::Completed)
    }

    async fn fail(
        &self,
        mut job: ReportJob,
        metrics: &mut ReportMetrics,
        message: String,
    ) -> Result<GenerationOutcome, ReportError> {
        let now = Utc::now();
        error!(
            job_id = %job.id,
            report_type = %job.report_type,
            error = %message,
            "Report generation failed"
        );

        job.fail_generation(message, now)?;
        if !self.stores.jobs.finish_generation(&job).await? {
            warn!(job_id = %job.id, "Report job left GENERATING before failure was recorded");
            return Ok(GenerationOutcome::Skipped);
        }

        metrics.record_failure(now);
        if let Err(e) = self.stores.metrics.upsert_metrics(metrics).await {
            warn!(job_id = %job.id, error = %e, "Failed to store report metrics");
        }
        Ok(GenerationOutcome::Failed)
    }

    async fn discard_artifact(&self, job_id: Uuid, location: &str) {
        if let Err(e) = remove_artifact(&self.storage, location).await {
            warn!(job_id = %job_id, error = %e, "Failed to delete report artifact");
        }
    }

    /// Fails jobs that have been GENERATING for longer than the generation
    /// timeout, e.g. after a crashed worker or a lost store write, and
    /// removes any artifact they left behind.
    pub async fn recover_stale(&self, now: DateTime<Utc>) -> Result<u32, ReportError> {
        let Some(cutoff) = chrono::Duration::from_std(self.settings.generation_timeout)
            .ok()
            .and_then(|timeout| now.checked_sub_signed(timeout))
        else {
            return Ok(0);
        };
        let message = format!(
            "Generation did not finish within {} seconds",
            self.settings.generation_timeout.as_secs()
        );

        let stale = self
            .stores
            .jobs
            .fail_stale_generations(cutoff, now, &message)
            .await?;
        for job in &stale {
            warn!(job_id = %job.id, started_at = ?job.started_at, "Stale report generation failed");
            self.discard_artifact(job.id, &artifact_path(job)).await;

            let mut metrics = match self.stores.metrics.find_metrics(job.id).await {
                Ok(Some(existing)) => existing,
                _ => ReportMetrics::new(job.id, now),
            };
            metrics.record_failure(now);
            if let Err(e) = self.stores.metrics.upsert_metrics(&metrics).await {
                warn!(job_id = %job.id, error = %e, "Failed to store report metrics");
            }
            record_generation(job.format.as_str(), GenerationOutcome::Failed.as_str(), 0.0);
        }
        Ok(stale.len() as u32)
    }

    /// Moves a job that can never be generated to FAILED so the worker does
    /// not pick it again.
    pub async fn reject(&self, job_id: Uuid, reason: &ReportError) -> Result<bool, ReportError> {
        let Some(job) = self.stores.jobs.begin_generation(job_id, Utc::now()).await? else {
            return Ok(false);
        };
        let mut metrics = self
            .stores
            .metrics
            .find_metrics(job_id)
            .await?
            .unwrap_or_else(|| ReportMetrics::new(job_id, Utc::now()));
        let outcome = self.fail(job, &mut metrics, reason.to_string()).await?;
        Ok(outcome == GenerationOutcome::Failed)
    }

    /// Generates up to `batch_size` pending jobs, at most
    /// `worker_concurrency` at a time. Errors of individual jobs are logged
    /// and never abort the pass.
    pub async fn process_pending(&self, batch_size: u32) -> Result<ProcessSummary, ReportError> {
        let mut summary = ProcessSummary::default();
        match self.recover_stale(Utc::now()).await {
            Ok(recovered) => summary.recovered = recovered,
            Err(e) => error!(error = %e, "Failed to recover stale report generations"),
        }

        let pending = self.stores.jobs.find_pending_jobs(batch_size).await?;
        if pending.is_empty() {
            return Ok(summary);
        }

        let permits = Arc::new(Semaphore::new(self.settings.worker_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for job in pending {
            let service = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (job.id, service.generate(job.id).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(GenerationOutcome::Completed))) => summary.completed += 1,
                Ok((_, Ok(GenerationOutcome::Failed))) => summary.failed += 1,
                Ok((_, Ok(GenerationOutcome::Skipped))) => summary.skipped += 1,
                Ok((job_id, Err(e))) => {
                    error!(job_id = %job_id, error = %e, "Report job cannot be generated");
                    if matches!(e, ReportError::Configuration(_) | ReportError::Validation(_)) {
                        match self.reject(job_id, &e).await {
                            Ok(true) => summary.failed += 1,
                            Ok(false) => summary.skipped += 1,
                            Err(reject_err) => error!(
                                job_id = %job_id,
                                error = %reject_err,
                                "Failed to mark report job as failed"
                            ),
                        }
                    }
                }
                Err(e) => error!(error = %e, "Report generation task panicked"),
            }
        }

        Ok(summary)
    }
}

/// Writes coalesced progress updates until the sender is dropped.
async fn persist_progress(
    stores: ReportStores,
    job_id: Uuid,
    mut updates: watch::Receiver<Option<ProgressUpdate>>,
) {
    while updates.changed().await.is_ok() {
        let update = updates.borrow_and_update().clone();
        let Some(update) = update else {
            continue;
        };
        if let Err(e) = stores
            .jobs
            .record_progress(job_id, update.percent, &update.message())
            .await
        {
            warn!(job_id = %job_id, error = %e, "Failed to record report progress");
        }
    }
}

/// Peak resident set size of the process, where the platform exposes it.
fn peak_memory_mb() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_peak_rss_mb(&status)
}

fn parse_peak_rss_mb(status: &str) -> Option<f64> {
    let line = status.lines().find(|l| l.starts_with("VmHWM:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024.0)
}
