//! Retention sweep for completed report artifacts.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use domain::models::ReportJob;
use domain::services::{ArtifactStorage, ExpiryCursor, ReportStores};
use domain::ReportError;

use super::artifacts::remove_artifact;
use crate::middleware::metrics::record_sweep_expired;

/// Counts of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub expired: u64,
    /// Jobs whose artifact could not be deleted; left COMPLETED for the
    /// next pass.
    pub retried_later: u64,
}

#[derive(Clone)]
pub struct ReportRetentionService {
    stores: ReportStores,
    storage: Arc<dyn ArtifactStorage>,
    batch_size: u32,
}

impl ReportRetentionService {
    pub fn new(stores: ReportStores, storage: Arc<dyn ArtifactStorage>, batch_size: u32) -> Self {
        Self {
            stores,
            storage,
            batch_size,
        }
    }

    /// Expires COMPLETED jobs whose retention window ended before `now`.
    ///
    /// The artifact is deleted first; the job only moves to EXPIRED once it
    /// is gone. PENDING, GENERATING and FAILED jobs are never touched.
    /// Candidates are read in pages of `batch_size` along
    /// `(expires_at, id)`, so jobs left for a retry never hide later ones.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepSummary, ReportError> {
        let mut summary = SweepSummary::default();
        let mut cursor = None;

        loop {
            let candidates = self
                .stores
                .jobs
                .find_expired_jobs(now, cursor, self.batch_size)
                .await?;
            let Some(last) = candidates.last() else {
                break;
            };
            cursor = Some(ExpiryCursor::after(last));
            let short_page = candidates.len() < self.batch_size as usize;

            for job in candidates {
                self.expire_job(&job, &mut summary).await;
            }
            if short_page {
                break;
            }
        }

        if summary.expired > 0 || summary.retried_later > 0 {
            info!(
                expired = summary.expired,
                retried_later = summary.retried_later,
                "Report retention sweep finished"
            );
        }
        record_sweep_expired(summary.expired);
        Ok(summary)
    }

    async fn expire_job(&self, job: &ReportJob, summary: &mut SweepSummary) {
        if let Some(location) = &job.artifact_location {
            if let Err(e) = remove_artifact(&self.storage, location).await {
                warn!(
                    job_id = %job.id,
                    location = %location,
                    error = %e,
                    "Failed to delete expired report artifact, will retry"
                );
                summary.retried_later += 1;
                return;
            }
        }

        match self.stores.jobs.mark_expired(job.id).await {
            Ok(true) => {
                debug!(job_id = %job.id, "Report job expired");
                summary.expired += 1;
            }
            Ok(false) => debug!(job_id = %job.id, "Report job changed state during sweep"),
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Failed to mark report job expired");
                summary.retried_later += 1;
            }
        }
    }
}
