//! In-memory implementation of every report store.
//!
//! Used by tests and the `memory` development mode. All state sits behind a
//! single mutex, which makes each trait operation atomic.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use domain::models::{
    ReportJob, ReportJobFilter, ReportMetrics, ReportSchedule, ReportShare, ReportStatus,
    ReportTemplate, ScheduleStatus, ShareStatus,
};
use domain::services::{
    ExpiryCursor, ReportJobStore, ReportMetricsStore, ReportScheduleStore, ReportShareStore,
    ReportTemplateStore, StoreError,
};
use shared::pagination::PageRequest;
use uuid::Uuid;

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, ReportJob>,
    metrics: HashMap<Uuid, ReportMetrics>,
    shares: HashMap<String, ReportShare>,
    templates: HashMap<Uuid, ReportTemplate>,
    schedules: HashMap<Uuid, ReportSchedule>,
}

#[derive(Default)]
pub struct InMemoryReportStore {
    state: Mutex<State>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Database("in-memory store lock poisoned".to_string()))
    }
}

fn page<T>(items: Vec<T>, page: PageRequest) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let items = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect();
    (items, total)
}

#[async_trait::async_trait]
impl ReportJobStore for InMemoryReportStore {
    async fn insert_job(&self, job: &ReportJob) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!("report job {} already exists", job.id)));
        }
        state.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<ReportJob>, StoreError> {
        Ok(self.lock()?.jobs.get(&id).cloned())
    }

    async fn update_job(&self, job: &ReportJob) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        match state.jobs.get_mut(&job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict(format!("report job {} does not exist", job.id))),
        }
    }

    async fn begin_generation(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<ReportJob>, StoreError> {
        let mut state = self.lock()?;
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };
        match job.start_generation(now) {
            Ok(()) => Ok(Some(job.clone())),
            Err(_) => Ok(None),
        }
    }

    async fn requeue_job(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<Option<ReportJob>, StoreError> {
        let mut state = self.lock()?;
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };
        match job.regenerate(now, retention) {
            Ok(()) => Ok(Some(job.clone())),
            Err(_) => Ok(None),
        }
    }

    async fn fail_stale_generations(
        &self,
        started_before: DateTime<Utc>,
        now: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<ReportJob>, StoreError> {
        let mut state = self.lock()?;
        let mut failed = Vec::new();
        for job in state.jobs.values_mut() {
            let stale = job.status == ReportStatus::Generating
                && job.started_at.map_or(true, |started| started < started_before);
            if stale && job.fail_generation(message, now).is_ok() {
                failed.push(job.clone());
            }
        }
        Ok(failed)
    }

    async fn record_progress(&self, id: Uuid, percent: u8, message: &str) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(false);
        };
        Ok(job
            .update_progress(i64::from(percent), Some(message.to_string()))
            .is_ok())
    }

    async fn finish_generation(&self, job: &ReportJob) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.jobs.get_mut(&job.id) {
            Some(stored) if stored.status == ReportStatus::Generating => {
                *stored = job.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_jobs(&self, filter: &ReportJobFilter) -> Result<(Vec<ReportJob>, u64), StoreError> {
        let state = self.lock()?;
        let mut jobs: Vec<ReportJob> = state
            .jobs
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(page(jobs, filter.page))
    }

    async fn find_pending_jobs(&self, limit: u32) -> Result<Vec<ReportJob>, StoreError> {
        let state = self.lock()?;
        let mut jobs: Vec<ReportJob> = state
            .jobs
            .values()
            .filter(|job| job.status == ReportStatus::Pending)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn find_expired_jobs(
        &self,
        now: DateTime<Utc>,
        after: Option<ExpiryCursor>,
        limit: u32,
    ) -> Result<Vec<ReportJob>, StoreError> {
        let state = self.lock()?;
        let after = after.map(|cursor| (cursor.expires_at, cursor.id));
        let mut jobs: Vec<ReportJob> = state
            .jobs
            .values()
            .filter(|job| job.status == ReportStatus::Completed && job.is_past_retention(now))
            .filter(|job| after.map_or(true, |after| (job.expires_at, job.id) > after))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| (job.expires_at, job.id));
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn mark_expired(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        Ok(state
            .jobs
            .get_mut(&id)
            .map_or(false, |job| job.expire().is_ok()))
    }

    async fn delete_job(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let removed = state.jobs.remove(&id).is_some();
        state.metrics.remove(&id);
        state.shares.retain(|_, share| share.job_id != id);
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl ReportMetricsStore for InMemoryReportStore {
    async fn upsert_metrics(&self, metrics: &ReportMetrics) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let mut metrics = metrics.clone();
        if let Some(existing) = state.metrics.get(&metrics.job_id) {
            metrics.download_count = existing.download_count;
            metrics.last_downloaded = existing.last_downloaded;
            metrics.created_at = existing.created_at;
        }
        state.metrics.insert(metrics.job_id, metrics);
        Ok(())
    }

    async fn find_metrics(&self, job_id: Uuid) -> Result<Option<ReportMetrics>, StoreError> {
        Ok(self.lock()?.metrics.get(&job_id).cloned())
    }

    async fn record_download(&self, job_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(metrics) = self.lock()?.metrics.get_mut(&job_id) {
            metrics.record_download(now);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReportShareStore for InMemoryReportStore {
    async fn insert_share(&self, share: &ReportShare) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.shares.contains_key(&share.token) {
            return Err(StoreError::Conflict("share token already exists".to_string()));
        }
        state.shares.insert(share.token.clone(), share.clone());
        Ok(())
    }

    async fn find_share_by_token(&self, token: &str) -> Result<Option<ReportShare>, StoreError> {
        Ok(self.lock()?.shares.get(token).cloned())
    }

    async fn update_share(&self, share: &ReportShare) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        match state.shares.get_mut(&share.token) {
            Some(stored) => {
                *stored = share.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict(format!("share {} does not exist", share.id))),
        }
    }

    async fn list_shares_for_job(&self, job_id: Uuid) -> Result<Vec<ReportShare>, StoreError> {
        let state = self.lock()?;
        let mut shares: Vec<ReportShare> = state
            .shares
            .values()
            .filter(|share| share.job_id == job_id)
            .cloned()
            .collect();
        shares.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(shares)
    }

    async fn record_share_access(&self, token: &str, now: DateTime<Utc>) -> Result<Option<ReportShare>, StoreError> {
        let mut state = self.lock()?;
        match state.shares.get_mut(token) {
            Some(share) if share.status == ShareStatus::Active => {
                share.record_access(now);
                Ok(Some(share.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_share_download(&self, token: &str, now: DateTime<Utc>) -> Result<Option<ReportShare>, StoreError> {
        let mut state = self.lock()?;
        match state.shares.get_mut(token) {
            Some(share) if share.is_valid(now) => {
                share.record_download(now);
                Ok(Some(share.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl ReportTemplateStore for InMemoryReportStore {
    async fn insert_template(&self, template: &ReportTemplate) -> Result<(), StoreError> {
        self.lock()?.templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn find_template(&self, id: Uuid) -> Result<Option<ReportTemplate>, StoreError> {
        Ok(self.lock()?.templates.get(&id).cloned())
    }

    async fn record_template_use(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(template) = self.lock()?.templates.get_mut(&id) {
            template.record_use(now);
        }
        Ok(())
    }

    async fn list_templates(
        &self,
        actor: Option<Uuid>,
        page_request: PageRequest,
    ) -> Result<(Vec<ReportTemplate>, u64), StoreError> {
        let state = self.lock()?;
        let mut templates: Vec<ReportTemplate> = state
            .templates
            .values()
            .filter(|template| template.visible_to(actor))
            .cloned()
            .collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(page(templates, page_request))
    }
}

#[async_trait::async_trait]
impl ReportScheduleStore for InMemoryReportStore {
    async fn insert_schedule(&self, schedule: &ReportSchedule) -> Result<(), StoreError> {
        self.lock()?.schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn find_schedule(&self, id: Uuid) -> Result<Option<ReportSchedule>, StoreError> {
        Ok(self.lock()?.schedules.get(&id).cloned())
    }

    async fn update_schedule(&self, schedule: &ReportSchedule) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        match state.schedules.get_mut(&schedule.id) {
            Some(stored) => {
                *stored = schedule.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict(format!("schedule {} does not exist", schedule.id))),
        }
    }

    async fn list_schedules(&self, page_request: PageRequest) -> Result<(Vec<ReportSchedule>, u64), StoreError> {
        let state = self.lock()?;
        let mut schedules: Vec<ReportSchedule> = state.schedules.values().cloned().collect();
        schedules.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(page(schedules, page_request))
    }

    async fn find_due_schedules(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<ReportSchedule>, StoreError> {
        let state = self.lock()?;
        let mut due: Vec<ReportSchedule> = state
            .schedules
            .values()
            .filter(|s| s.status == ScheduleStatus::Active && s.next_run.map_or(false, |next| next <= now))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_run);
        due.truncate(limit as usize);
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{ExportFormat, NewReportJob, NewReportShare, ReportType};
    use std::sync::Arc;

    fn job(now: DateTime<Utc>) -> ReportJob {
        ReportJob::new(
            NewReportJob::new(ReportType::Summary, ExportFormat::DelimitedText),
            now,
            Duration::days(30),
        )
    }

    #[tokio::test]
    async fn test_begin_generation_is_single_flight() {
        let store = Arc::new(InMemoryReportStore::new());
        let now = Utc::now();
        let job = job(now);
        store.insert_job(&job).await.unwrap();
        let id = job.id;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.begin_generation(id, now).await }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let store = InMemoryReportStore::new();
        let now = Utc::now();
        let job = job(now);
        store.insert_job(&job).await.unwrap();
        assert!(!store.record_progress(job.id, 10, "rows").await.unwrap());

        store.begin_generation(job.id, now).await.unwrap();
        assert!(store.record_progress(job.id, 40, "40 rows").await.unwrap());
        store.record_progress(job.id, 20, "20 rows").await.unwrap();
        let stored = store.find_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.progress_percentage, 40);
    }

    #[tokio::test]
    async fn test_finish_requires_generating() {
        let store = InMemoryReportStore::new();
        let now = Utc::now();
        let mut job = job(now);
        store.insert_job(&job).await.unwrap();

        job.start_generation(now).unwrap();
        job.complete_generation("a.csv", 10, 1, now).unwrap();
        assert!(!store.finish_generation(&job).await.unwrap());

        store.begin_generation(job.id, now).await.unwrap();
        assert!(store.finish_generation(&job).await.unwrap());
        assert!(!store.finish_generation(&job).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_job_selection_and_mark() {
        let store = InMemoryReportStore::new();
        let now = Utc::now();
        let mut old = job(now - Duration::days(40));
        old.start_generation(now).unwrap();
        old.complete_generation("a.csv", 10, 1, now).unwrap();
        store.insert_job(&old).await.unwrap();
        store.insert_job(&job(now)).await.unwrap();

        let expired = store.find_expired_jobs(now, None, 10).await.unwrap();
        assert_eq!(expired.len(), 1);
        let cursor = ExpiryCursor::after(&expired[0]);
        assert!(store.find_expired_jobs(now, Some(cursor), 10).await.unwrap().is_empty());
        assert!(store.mark_expired(old.id).await.unwrap());
        assert!(!store.mark_expired(old.id).await.unwrap());
        assert!(store.find_expired_jobs(now, None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requeue_only_from_failed_or_expired() {
        let store = InMemoryReportStore::new();
        let now = Utc::now();
        let mut job = job(now);
        store.insert_job(&job).await.unwrap();
        assert!(store.requeue_job(job.id, now, Duration::days(30)).await.unwrap().is_none());

        job.start_generation(now).unwrap();
        job.fail_generation("source offline", now).unwrap();
        store.update_job(&job).await.unwrap();

        let requeued = store.requeue_job(job.id, now, Duration::days(30)).await.unwrap().unwrap();
        assert_eq!(requeued.status, ReportStatus::Pending);
        assert!(requeued.error_message.is_none());
        assert!(store.requeue_job(job.id, now, Duration::days(30)).await.unwrap().is_none());
        assert!(store.requeue_job(Uuid::new_v4(), now, Duration::days(30)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fail_stale_generations() {
        let store = InMemoryReportStore::new();
        let now = Utc::now();
        let stale = job(now);
        let fresh = job(now);
        store.insert_job(&stale).await.unwrap();
        store.insert_job(&fresh).await.unwrap();
        store.begin_generation(stale.id, now - Duration::hours(2)).await.unwrap();
        store.begin_generation(fresh.id, now).await.unwrap();

        let failed = store
            .fail_stale_generations(now - Duration::hours(1), now, "timed out")
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, stale.id);
        assert_eq!(failed[0].error_message.as_deref(), Some("timed out"));

        let fresh = store.find_job(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, ReportStatus::Generating);
    }

    #[tokio::test]
    async fn test_share_download_cap() {
        let store = InMemoryReportStore::new();
        let now = Utc::now();
        let share = ReportShare::new(
            Uuid::new_v4(),
            "tok".to_string(),
            NewReportShare {
                max_downloads: Some(1),
                ..Default::default()
            },
            now,
        );
        store.insert_share(&share).await.unwrap();

        let first = store.record_share_download("tok", now).await.unwrap().unwrap();
        assert_eq!(first.status, ShareStatus::Expired);
        assert!(store.record_share_download("tok", now).await.unwrap().is_none());
        assert!(store.record_share_access("tok", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_job_cascades() {
        let store = InMemoryReportStore::new();
        let now = Utc::now();
        let job = job(now);
        store.insert_job(&job).await.unwrap();
        store.upsert_metrics(&ReportMetrics::new(job.id, now)).await.unwrap();
        store
            .insert_share(&ReportShare::new(job.id, "t".to_string(), NewReportShare::default(), now))
            .await
            .unwrap();

        assert!(store.delete_job(job.id).await.unwrap());
        assert!(store.find_metrics(job.id).await.unwrap().is_none());
        assert!(store.list_shares_for_job(job.id).await.unwrap().is_empty());
        assert!(!store.delete_job(job.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_keeps_download_counter() {
        let store = InMemoryReportStore::new();
        let now = Utc::now();
        let job_id = Uuid::new_v4();
        store.upsert_metrics(&ReportMetrics::new(job_id, now)).await.unwrap();
        store.record_download(job_id, now).await.unwrap();

        let mut metrics = ReportMetrics::new(job_id, now);
        metrics.record_failure(now);
        store.upsert_metrics(&metrics).await.unwrap();

        let stored = store.find_metrics(job_id).await.unwrap().unwrap();
        assert_eq!(stored.download_count, 1);
        assert_eq!(stored.error_count, 1);
    }
}
