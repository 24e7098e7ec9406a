//! Recurring report schedules.
//!
//! Executions of one schedule are serialized through a per-schedule async
//! mutex; due-ness is re-checked after the lock is taken so overlapping
//! ticks fire a schedule at most once. The lock map only holds weak
//! references, so a schedule's mutex lives as long as someone holds it.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use domain::models::{
    parse_run_time, CreateReportScheduleRequest, NewReportJob, NewReportSchedule, ReportJob,
    ReportParameters, ReportSchedule, ReportStatus, ScheduleStatus, ScheduleTimezone,
};
use domain::services::ReportStores;
use domain::ReportError;
use shared::pagination::{PageInfo, PageRequest};

use super::report_generation::{GenerationOutcome, ReportGenerationService};
use crate::middleware::metrics::record_schedule_run;

/// Upper bound of schedules handled per dispatch tick.
const DUE_SCHEDULE_BATCH: u32 = 100;

/// Result of one schedule execution.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleExecution {
    pub schedule_id: Uuid,
    pub job_id: Option<Uuid>,
    pub job_status: Option<ReportStatus>,
    pub error: Option<String>,
    pub next_run: Option<DateTime<Utc>>,
}

/// Counts of one dispatch tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleRunSummary {
    pub executed: u32,
    pub failed: u32,
    pub disabled: u32,
    pub skipped: u32,
}

enum Dispatch {
    NotDue,
    Disabled,
    Executed(ScheduleExecution),
}

#[derive(Clone)]
pub struct ReportScheduleService {
    stores: ReportStores,
    generation: ReportGenerationService,
    retention: Duration,
    locks: Arc<Mutex<HashMap<Uuid, Weak<Mutex<()>>>>>,
}

impl ReportScheduleService {
    pub fn new(stores: ReportStores, generation: ReportGenerationService, retention: Duration) -> Self {
        Self {
            stores,
            generation,
            retention,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Next execution after the schedule's last run (or its start date).
    pub fn calculate_next_run(schedule: &ReportSchedule) -> DateTime<Utc> {
        schedule.calculate_next_run()
    }

    /// Start date at the schedule's run time.
    pub fn first_run(schedule: &ReportSchedule) -> DateTime<Utc> {
        schedule.first_run()
    }

    pub async fn create_schedule(
        &self,
        request: CreateReportScheduleRequest,
        actor: Option<Uuid>,
    ) -> Result<ReportSchedule, ReportError> {
        request.validate()?;
        let run_time = parse_run_time(&request.run_time)?;
        let timezone = match request.timezone.as_deref() {
            Some(tz) => tz
                .parse::<ScheduleTimezone>()
                .map_err(|e| ReportError::validation(format!("Invalid timezone: {}", e)))?,
            None => ScheduleTimezone::utc(),
        };
        let parameter_overrides = match &request.parameter_overrides {
            Some(value) => ReportParameters::from_json(value)?,
            None => ReportParameters::default(),
        };

        let template = self
            .stores
            .templates
            .find_template(request.template_id)
            .await?
            .filter(|t| t.visible_to(actor))
            .ok_or_else(|| ReportError::not_found(format!("Report template {}", request.template_id)))?;
        template.default_parameters.merged_with(&parameter_overrides).validate()?;
        if let Some(format) = request.format_override {
            self.generation.strategies().strategy_for(format)?;
        }

        let schedule = ReportSchedule::new(
            NewReportSchedule {
                name: request.name,
                frequency: request.frequency,
                template_id: template.id,
                parameter_overrides,
                format_override: request.format_override,
                start_date: request.start_date,
                end_date: request.end_date,
                run_time,
                timezone,
                created_by: actor,
            },
            Utc::now(),
        )?;
        self.stores.schedules.insert_schedule(&schedule).await?;

        info!(
            schedule_id = %schedule.id,
            frequency = %schedule.frequency,
            next_run = ?schedule.next_run,
            "Report schedule created"
        );
        Ok(schedule)
    }

    pub async fn get(&self, schedule_id: Uuid) -> Result<ReportSchedule, ReportError> {
        self.stores
            .schedules
            .find_schedule(schedule_id)
            .await?
            .ok_or_else(|| ReportError::not_found(format!("Report schedule {}", schedule_id)))
    }

    pub async fn list(&self, page: PageRequest) -> Result<(Vec<ReportSchedule>, PageInfo), ReportError> {
        let (schedules, total) = self.stores.schedules.list_schedules(page).await?;
        Ok((schedules, PageInfo::new(page, total)))
    }

    pub async fn pause(&self, schedule_id: Uuid) -> Result<ReportSchedule, ReportError> {
        self.mutate(schedule_id, |schedule, now| schedule.pause(now)).await
    }

    /// Resumes a paused schedule from its next future occurrence.
    pub async fn resume(&self, schedule_id: Uuid) -> Result<ReportSchedule, ReportError> {
        self.mutate(schedule_id, |schedule, now| schedule.resume(now)).await
    }

    pub async fn disable(&self, schedule_id: Uuid) -> Result<ReportSchedule, ReportError> {
        self.mutate(schedule_id, |schedule, now| {
            schedule.disable(now);
            Ok(())
        })
        .await
    }

    async fn mutate(
        &self,
        schedule_id: Uuid,
        change: impl FnOnce(&mut ReportSchedule, DateTime<Utc>) -> Result<(), ReportError>,
    ) -> Result<ReportSchedule, ReportError> {
        let lock = self.lock_for(schedule_id).await;
        let _guard = lock.lock().await;

        let mut schedule = self.get(schedule_id).await?;
        change(&mut schedule, Utc::now())?;
        self.stores.schedules.update_schedule(&schedule).await?;
        info!(schedule_id = %schedule.id, status = %schedule.status, "Report schedule updated");
        Ok(schedule)
    }

    async fn lock_for(&self, schedule_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        if let Some(lock) = locks.get(&schedule_id).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(Mutex::new(()));
        locks.insert(schedule_id, Arc::downgrade(&lock));
        lock
    }

    /// Fires every due schedule. One failing schedule never prevents the
    /// others from running.
    pub async fn run_due_schedules(&self, now: DateTime<Utc>) -> Result<ScheduleRunSummary, ReportError> {
        let due = self.stores.schedules.find_due_schedules(now, DUE_SCHEDULE_BATCH).await?;
        let mut summary = ScheduleRunSummary::default();

        for schedule in due {
            match self.dispatch(schedule.id, now, false).await {
                Ok(Dispatch::Executed(execution)) => {
                    if execution.error.is_some() {
                        summary.failed += 1;
                    } else {
                        summary.executed += 1;
                    }
                }
                Ok(Dispatch::Disabled) => summary.disabled += 1,
                Ok(Dispatch::NotDue) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!(schedule_id = %schedule.id, error = %e, "Report schedule dispatch failed");
                }
            }
        }

        Ok(summary)
    }

    /// Fires a schedule immediately. The next run is never moved backwards.
    pub async fn run_now(&self, schedule_id: Uuid) -> Result<ScheduleExecution, ReportError> {
        match self.dispatch(schedule_id, Utc::now(), true).await? {
            Dispatch::Executed(execution) => Ok(execution),
            Dispatch::NotDue | Dispatch::Disabled => Err(ReportError::validation(format!(
                "Report schedule {} is disabled",
                schedule_id
            ))),
        }
    }

    async fn dispatch(&self, schedule_id: Uuid, now: DateTime<Utc>, forced: bool) -> Result<Dispatch, ReportError> {
        let lock = self.lock_for(schedule_id).await;
        let _guard = lock.lock().await;

        let mut schedule = self.get(schedule_id).await?;
        if schedule.status == ScheduleStatus::Disabled {
            return Ok(Dispatch::Disabled);
        }
        if schedule.status == ScheduleStatus::Active && schedule.has_ended(now) {
            schedule.disable(now);
            self.stores.schedules.update_schedule(&schedule).await?;
            info!(schedule_id = %schedule.id, "Report schedule ended and was disabled");
            return Ok(Dispatch::Disabled);
        }
        if !forced && !schedule.is_due(now) {
            return Ok(Dispatch::NotDue);
        }

        let (job_id, job_status, error) = match self.execute(&schedule, now).await {
            Ok(job) => {
                let error = match job.status {
                    ReportStatus::Failed => job.error_message.clone(),
                    _ => None,
                };
                (Some(job.id), Some(job.status), error)
            }
            Err((job_id, e)) => (job_id, None, Some(e.to_string())),
        };

        schedule.record_run(now, job_id, error.clone());
        self.stores.schedules.update_schedule(&schedule).await?;

        match &error {
            Some(message) => {
                record_schedule_run("failure");
                warn!(
                    schedule_id = %schedule.id,
                    job_id = ?job_id,
                    error = %message,
                    "Scheduled report run failed"
                );
            }
            None => {
                record_schedule_run("success");
                info!(
                    schedule_id = %schedule.id,
                    job_id = ?job_id,
                    run_count = schedule.run_count,
                    next_run = ?schedule.next_run,
                    "Scheduled report run finished"
                );
            }
        }

        Ok(Dispatch::Executed(ScheduleExecution {
            schedule_id: schedule.id,
            job_id,
            job_status,
            error,
            next_run: schedule.next_run,
        }))
    }

    /// Creates the job for one execution and generates it inline.
    async fn execute(
        &self,
        schedule: &ReportSchedule,
        now: DateTime<Utc>,
    ) -> Result<ReportJob, (Option<Uuid>, ReportError)> {
        let template = self
            .stores
            .templates
            .find_template(schedule.template_id)
            .await
            .map_err(|e| (None, e.into()))?
            .ok_or_else(|| {
                (
                    None,
                    ReportError::not_found(format!("Report template {}", schedule.template_id)),
                )
            })?;

        let mut input = NewReportJob::new(
            template.report_type,
            schedule.format_override.unwrap_or(template.default_format),
        )
        .with_parameters(template.default_parameters.merged_with(&schedule.parameter_overrides))
        .with_title(format!("{} ({})", schedule.name, schedule.local_date(now)))
        .created_by(schedule.created_by);
        input.template_id = Some(template.id);
        input.schedule_id = Some(schedule.id);

        let job = ReportJob::new(input, now, self.retention);
        self.generation.check_generatable(&job).map_err(|e| (None, e))?;
        self.stores.jobs.insert_job(&job).await.map_err(|e| (None, e.into()))?;
        if let Err(e) = self.stores.templates.record_template_use(template.id, now).await {
            warn!(template_id = %template.id, error = %e, "Failed to record template use");
        }

        match self.generation.generate(job.id).await {
            Ok(GenerationOutcome::Completed | GenerationOutcome::Failed | GenerationOutcome::Skipped) => {}
            Err(e) => return Err((Some(job.id), e)),
        }

        self.stores
            .jobs
            .find_job(job.id)
            .await
            .map_err(|e| (Some(job.id), e.into()))?
            .ok_or_else(|| (Some(job.id), ReportError::not_found(format!("Report job {}", job.id))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::report_generation::GenerationSettings;
    use chrono::{NaiveDate, TimeZone};
    use domain::models::{ExportFormat, ReportTemplate, ReportType, ScheduleFrequency};
    use domain::services::{AdapterRegistry, InMemoryDataSource, StrategyFactory};
    use persistence::{InMemoryArtifactStorage, InMemoryReportStore};

    fn service(stores: &ReportStores) -> ReportScheduleService {
        let generation = ReportGenerationService::new(
            stores.clone(),
            Arc::new(InMemoryArtifactStorage::new()),
            AdapterRegistry::with_defaults(Arc::new(InMemoryDataSource::new())),
            StrategyFactory::with_defaults(),
            GenerationSettings::default(),
        );
        ReportScheduleService::new(stores.clone(), generation, Duration::days(30))
    }

    async fn template(stores: &ReportStores) -> ReportTemplate {
        let mut template =
            ReportTemplate::new("Staffing", ReportType::Summary, ExportFormat::DelimitedText, Utc::now());
        template.is_public = true;
        stores.templates.insert_template(&template).await.unwrap();
        template
    }

    fn weekly(template_id: Uuid, start: NaiveDate) -> ReportSchedule {
        let created = Utc.with_ymd_and_hms(2025, 12, 20, 0, 0, 0).unwrap();
        ReportSchedule::new(
            NewReportSchedule {
                name: "Weekly staffing".to_string(),
                frequency: ScheduleFrequency::Weekly,
                template_id,
                parameter_overrides: ReportParameters::default(),
                format_override: None,
                start_date: start,
                end_date: None,
                run_time: parse_run_time("09:00").unwrap(),
                timezone: ScheduleTimezone::utc(),
                created_by: None,
            },
            created,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_weekly_run_advances_seven_days() {
        let stores = ReportStores::from_single(Arc::new(InMemoryReportStore::new()));
        let service = service(&stores);
        let template = template(&stores).await;
        let schedule = weekly(template.id, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        let first = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        assert_eq!(schedule.next_run, Some(first));
        stores.schedules.insert_schedule(&schedule).await.unwrap();

        let summary = service.run_due_schedules(first).await.unwrap();
        assert_eq!(summary.executed, 1);

        let stored = stores.schedules.find_schedule(schedule.id).await.unwrap().unwrap();
        assert_eq!(stored.run_count, 1);
        assert_eq!(stored.last_run, Some(first));
        assert_eq!(stored.next_run, Some(Utc.with_ymd_and_hms(2026, 1, 8, 9, 0, 0).unwrap()));
        assert!(stored.last_error.is_none());

        let job = stores.jobs.find_job(stored.last_job_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(job.status, ReportStatus::Completed);
        assert_eq!(job.schedule_id, Some(schedule.id));

        let template = stores.templates.find_template(template.id).await.unwrap().unwrap();
        assert_eq!(template.usage_count, 1);

        let again = service.run_due_schedules(first).await.unwrap();
        assert_eq!(again, ScheduleRunSummary::default());
    }

    #[tokio::test]
    async fn test_missing_template_is_recorded_and_others_continue() {
        let stores = ReportStores::from_single(Arc::new(InMemoryReportStore::new()));
        let service = service(&stores);
        let template = template(&stores).await;
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

        let broken = weekly(Uuid::new_v4(), start);
        let healthy = weekly(template.id, start);
        stores.schedules.insert_schedule(&broken).await.unwrap();
        stores.schedules.insert_schedule(&healthy).await.unwrap();

        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 30, 0).unwrap();
        let summary = service.run_due_schedules(now).await.unwrap();
        assert_eq!(summary.executed, 1);
        assert_eq!(summary.failed, 1);

        let broken = stores.schedules.find_schedule(broken.id).await.unwrap().unwrap();
        assert!(broken.last_error.unwrap().starts_with("Not found: Report template"));
        assert_eq!(broken.run_count, 1);
        assert!(broken.next_run.unwrap() > now);
    }

    #[tokio::test]
    async fn test_schedule_locks_are_released() {
        let stores = ReportStores::from_single(Arc::new(InMemoryReportStore::new()));
        let service = service(&stores);
        let held_id = Uuid::new_v4();
        let held = service.lock_for(held_id).await;
        assert!(Arc::ptr_eq(&held, &service.lock_for(held_id).await));

        for _ in 0..20 {
            drop(service.lock_for(Uuid::new_v4()).await);
        }
        let locks = service.locks.lock().await;
        assert!(locks.len() <= 2);
        assert!(locks.contains_key(&held_id));
    }

    #[tokio::test]
    async fn test_ended_schedule_is_disabled() {
        let stores = ReportStores::from_single(Arc::new(InMemoryReportStore::new()));
        let service = service(&stores);
        let template = template(&stores).await;
        let mut schedule = weekly(template.id, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        schedule.end_date = NaiveDate::from_ymd_opt(2026, 1, 5);
        stores.schedules.insert_schedule(&schedule).await.unwrap();

        let later = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        let summary = service.run_due_schedules(later).await.unwrap();
        assert_eq!(summary.disabled, 1);

        let stored = service.get(schedule.id).await.unwrap();
        assert_eq!(stored.status, ScheduleStatus::Disabled);
        assert_eq!(stored.run_count, 0);
    }

    #[tokio::test]
    async fn test_run_now_does_not_move_next_run_backwards() {
        let stores = ReportStores::from_single(Arc::new(InMemoryReportStore::new()));
        let service = service(&stores);
        let template = template(&stores).await;
        let schedule = weekly(template.id, NaiveDate::from_ymd_opt(2099, 1, 1).unwrap());
        let planned = schedule.next_run;
        stores.schedules.insert_schedule(&schedule).await.unwrap();

        let execution = service.run_now(schedule.id).await.unwrap();
        assert!(execution.job_id.is_some());
        assert_eq!(execution.job_status, Some(ReportStatus::Completed));
        assert!(execution.next_run >= planned);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let stores = ReportStores::from_single(Arc::new(InMemoryReportStore::new()));
        let service = service(&stores);
        let template = template(&stores).await;
        let schedule = weekly(template.id, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        stores.schedules.insert_schedule(&schedule).await.unwrap();

        let paused = service.pause(schedule.id).await.unwrap();
        assert_eq!(paused.status, ScheduleStatus::Paused);
        assert!(matches!(service.pause(schedule.id).await, Err(ReportError::Validation(_))));

        let resumed = service.resume(schedule.id).await.unwrap();
        assert_eq!(resumed.status, ScheduleStatus::Active);
        assert!(resumed.next_run.unwrap() >= Utc::now());

        let disabled = service.disable(schedule.id).await.unwrap();
        assert_eq!(disabled.status, ScheduleStatus::Disabled);
        assert!(matches!(service.run_now(schedule.id).await, Err(ReportError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_schedule_validates_input() {
        let stores = ReportStores::from_single(Arc::new(InMemoryReportStore::new()));
        let service = service(&stores);
        let template = template(&stores).await;

        let request = CreateReportScheduleRequest {
            name: "Monthly venues".to_string(),
            frequency: ScheduleFrequency::Monthly,
            template_id: template.id,
            parameter_overrides: None,
            format_override: Some(ExportFormat::StructuredData),
            start_date: NaiveDate::from_ymd_opt(2099, 1, 1).unwrap(),
            end_date: None,
            run_time: "07:30".to_string(),
            timezone: Some("+02:00".to_string()),
        };
        let schedule = service.create_schedule(request.clone(), None).await.unwrap();
        assert_eq!(schedule.next_run, Some(Utc.with_ymd_and_hms(2099, 1, 1, 5, 30, 0).unwrap()));

        let bad_time = CreateReportScheduleRequest {
            run_time: "7h30".to_string(),
            ..request.clone()
        };
        assert!(matches!(
            service.create_schedule(bad_time, None).await,
            Err(ReportError::Validation(_))
        ));

        let unknown_template = CreateReportScheduleRequest {
            template_id: Uuid::new_v4(),
            ..request
        };
        assert!(matches!(
            service.create_schedule(unknown_template, None).await,
            Err(ReportError::NotFound(_))
        ));
    }
}
