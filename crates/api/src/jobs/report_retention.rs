//! Periodic retention sweep.

use chrono::Utc;

use crate::services::ReportRetentionService;

use super::scheduler::{Job, JobFrequency};

pub struct ReportRetentionJob {
    service: ReportRetentionService,
    interval_secs: u64,
}

impl ReportRetentionJob {
    pub fn new(service: ReportRetentionService, interval_secs: u64) -> Self {
        Self {
            service,
            interval_secs,
        }
    }
}

#[async_trait::async_trait]
impl Job for ReportRetentionJob {
    fn name(&self) -> &'static str {
        "report_retention"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::from_secs(self.interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        self.service
            .sweep(Utc::now())
            .await
            .map(|_| ())
            .map_err(|e| format!("Failed to sweep expired reports: {}", e))
    }
}
