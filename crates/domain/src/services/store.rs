//! Persistence abstractions for the report engine.
//!
//! The PostgreSQL repositories and the in-memory store implement these
//! traits. Operations documented as atomic must be implemented as a single
//! conditional update (or under one lock) so concurrent callers cannot both
//! succeed.

use chrono::{DateTime, Duration, Utc};
use shared::pagination::PageRequest;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ReportJob, ReportJobFilter, ReportMetrics, ReportSchedule, ReportShare, ReportTemplate,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("conflicting update: {0}")]
    Conflict(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Position in the `(expires_at, id)` order of expired jobs. A page starts
/// strictly after the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryCursor {
    pub expires_at: DateTime<Utc>,
    pub id: Uuid,
}

impl ExpiryCursor {
    pub fn after(job: &ReportJob) -> Self {
        Self {
            expires_at: job.expires_at,
            id: job.id,
        }
    }
}

#[async_trait::async_trait]
pub trait ReportJobStore: Send + Sync {
    async fn insert_job(&self, job: &ReportJob) -> Result<(), StoreError>;

    async fn find_job(&self, id: Uuid) -> Result<Option<ReportJob>, StoreError>;

    /// Overwrites the stored job.
    async fn update_job(&self, job: &ReportJob) -> Result<(), StoreError>;

    /// Atomically moves a PENDING job to GENERATING and returns it. Returns
    /// `None` when the job is missing or not PENDING.
    async fn begin_generation(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<ReportJob>, StoreError>;

    /// Atomically moves a FAILED or EXPIRED job back to PENDING, clearing
    /// the previous run and restarting retention at `now + retention`.
    /// Returns `None` when the job is missing or in any other state.
    async fn requeue_job(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<Option<ReportJob>, StoreError>;

    /// Atomically fails every GENERATING job started before
    /// `started_before`, recording `message`. Returns the failed jobs.
    async fn fail_stale_generations(
        &self,
        started_before: DateTime<Utc>,
        now: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<ReportJob>, StoreError>;

    /// Stores progress for a GENERATING job without ever lowering it.
    /// Returns `false` when the job is no longer GENERATING.
    async fn record_progress(&self, id: Uuid, percent: u8, message: &str) -> Result<bool, StoreError>;

    /// Stores a terminal outcome only if the stored job is still GENERATING.
    async fn finish_generation(&self, job: &ReportJob) -> Result<bool, StoreError>;

    /// Matching jobs, newest first, with the total match count.
    async fn list_jobs(&self, filter: &ReportJobFilter) -> Result<(Vec<ReportJob>, u64), StoreError>;

    /// Oldest PENDING jobs first.
    async fn find_pending_jobs(&self, limit: u32) -> Result<Vec<ReportJob>, StoreError>;

    /// COMPLETED jobs whose `expires_at` is before `now`, ordered by
    /// `(expires_at, id)` and starting after `after`.
    async fn find_expired_jobs(
        &self,
        now: DateTime<Utc>,
        after: Option<ExpiryCursor>,
        limit: u32,
    ) -> Result<Vec<ReportJob>, StoreError>;

    /// Atomically moves a COMPLETED job to EXPIRED, clearing its artifact.
    async fn mark_expired(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Deletes the job together with its metrics and shares.
    async fn delete_job(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait::async_trait]
pub trait ReportMetricsStore: Send + Sync {
    async fn upsert_metrics(&self, metrics: &ReportMetrics) -> Result<(), StoreError>;

    async fn find_metrics(&self, job_id: Uuid) -> Result<Option<ReportMetrics>, StoreError>;

    /// Atomically increments the download counter.
    async fn record_download(&self, job_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait ReportShareStore: Send + Sync {
    async fn insert_share(&self, share: &ReportShare) -> Result<(), StoreError>;

    async fn find_share_by_token(&self, token: &str) -> Result<Option<ReportShare>, StoreError>;

    async fn update_share(&self, share: &ReportShare) -> Result<(), StoreError>;

    async fn list_shares_for_job(&self, job_id: Uuid) -> Result<Vec<ReportShare>, StoreError>;

    /// Atomically counts an access on an ACTIVE share. Returns the updated
    /// share, or `None` when it is no longer ACTIVE.
    async fn record_share_access(&self, token: &str, now: DateTime<Utc>) -> Result<Option<ReportShare>, StoreError>;

    /// Atomically counts a download on an ACTIVE share that is under its
    /// cap, expiring the share when the cap is reached. Returns `None` when
    /// the download is not allowed.
    async fn record_share_download(&self, token: &str, now: DateTime<Utc>) -> Result<Option<ReportShare>, StoreError>;
}

#[async_trait::async_trait]
pub trait ReportTemplateStore: Send + Sync {
    async fn insert_template(&self, template: &ReportTemplate) -> Result<(), StoreError>;

    async fn find_template(&self, id: Uuid) -> Result<Option<ReportTemplate>, StoreError>;

    /// Atomically increments usage and sets `last_used`.
    async fn record_template_use(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Templates visible to `actor`, ordered by name.
    async fn list_templates(
        &self,
        actor: Option<Uuid>,
        page: PageRequest,
    ) -> Result<(Vec<ReportTemplate>, u64), StoreError>;
}

#[async_trait::async_trait]
pub trait ReportScheduleStore: Send + Sync {
    async fn insert_schedule(&self, schedule: &ReportSchedule) -> Result<(), StoreError>;

    async fn find_schedule(&self, id: Uuid) -> Result<Option<ReportSchedule>, StoreError>;

    async fn update_schedule(&self, schedule: &ReportSchedule) -> Result<(), StoreError>;

    async fn list_schedules(&self, page: PageRequest) -> Result<(Vec<ReportSchedule>, u64), StoreError>;

    /// ACTIVE schedules with `next_run <= now`, earliest first.
    async fn find_due_schedules(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<ReportSchedule>, StoreError>;
}

/// The set of stores the report services depend on.
#[derive(Clone)]
pub struct ReportStores {
    pub jobs: Arc<dyn ReportJobStore>,
    pub metrics: Arc<dyn ReportMetricsStore>,
    pub shares: Arc<dyn ReportShareStore>,
    pub templates: Arc<dyn ReportTemplateStore>,
    pub schedules: Arc<dyn ReportScheduleStore>,
}

impl ReportStores {
    /// Uses one value implementing every store trait.
    pub fn from_single<S>(store: Arc<S>) -> Self
    where
        S: ReportJobStore
            + ReportMetricsStore
            + ReportShareStore
            + ReportTemplateStore
            + ReportScheduleStore
            + 'static,
    {
        Self {
            jobs: store.clone(),
            metrics: store.clone(),
            shares: store.clone(),
            templates: store.clone(),
            schedules: store,
        }
    }
}
