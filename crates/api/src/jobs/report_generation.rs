//! Worker that generates queued report jobs.

use tracing::info;

use crate::services::ReportGenerationService;

use super::scheduler::{Job, JobFrequency};

/// Picks up PENDING report jobs and generates them.
pub struct ReportGenerationJob {
    service: ReportGenerationService,
    batch_size: u32,
    interval_secs: u64,
}

impl ReportGenerationJob {
    pub fn new(service: ReportGenerationService, batch_size: u32, interval_secs: u64) -> Self {
        Self {
            service,
            batch_size,
            interval_secs,
        }
    }
}

#[async_trait::async_trait]
impl Job for ReportGenerationJob {
    fn name(&self) -> &'static str {
        "report_generation"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::from_secs(self.interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        let summary = self
            .service
            .process_pending(self.batch_size)
            .await
            .map_err(|e| format!("Failed to process report jobs: {}", e))?;

        if summary.processed() > 0 {
            info!(
                completed = summary.completed,
                failed = summary.failed,
                skipped = summary.skipped,
                batch_size = self.batch_size,
                "Processed report generation jobs"
            );
        }

        Ok(())
    }
}
