//! Dispatcher for due report schedules.

use chrono::Utc;
use tracing::info;

use crate::services::ReportScheduleService;

use super::scheduler::{Job, JobFrequency};

pub struct ScheduleDispatchJob {
    service: ReportScheduleService,
    interval_secs: u64,
}

impl ScheduleDispatchJob {
    pub fn new(service: ReportScheduleService, interval_secs: u64) -> Self {
        Self {
            service,
            interval_secs,
        }
    }
}

#[async_trait::async_trait]
impl Job for ScheduleDispatchJob {
    fn name(&self) -> &'static str {
        "report_schedule_dispatch"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::from_secs(self.interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        let summary = self
            .service
            .run_due_schedules(Utc::now())
            .await
            .map_err(|e| format!("Failed to dispatch report schedules: {}", e))?;

        if summary.executed + summary.failed + summary.disabled > 0 {
            info!(
                executed = summary.executed,
                failed = summary.failed,
                disabled = summary.disabled,
                "Dispatched report schedules"
            );
        }
        Ok(())
    }
}
