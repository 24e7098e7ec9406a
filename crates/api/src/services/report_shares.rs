//! Share links for generated reports.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use domain::models::{
    CreateShareRequest, NewReportShare, ReportMetrics, ReportShare, ReportStatus, ShareAccessGrant,
    ShareAction, ShareDenial,
};
use domain::services::{ArtifactStorage, ReportStores};
use domain::ReportError;
use shared::crypto::{generate_share_token, token_prefix};
use shared::password::hash_password;

use super::artifacts::read_artifact;
use super::report_jobs::{check_bulk_size, BulkOutcome, ReportDownload};
use crate::middleware::metrics::record_share_access;

#[derive(Clone)]
pub struct ReportShareService {
    stores: ReportStores,
    storage: Arc<dyn ArtifactStorage>,
    max_bulk_items: usize,
}

impl ReportShareService {
    pub fn new(stores: ReportStores, storage: Arc<dyn ArtifactStorage>, max_bulk_items: usize) -> Self {
        Self {
            stores,
            storage,
            max_bulk_items,
        }
    }

    /// Creates a share for a COMPLETED job.
    pub async fn create_share(
        &self,
        job_id: Uuid,
        request: CreateShareRequest,
        actor: Option<Uuid>,
    ) -> Result<ReportShare, ReportError> {
        request.validate()?;
        let now = Utc::now();

        let job = self
            .stores
            .jobs
            .find_job(job_id)
            .await?
            .ok_or_else(|| ReportError::not_found(format!("Report job {}", job_id)))?;
        if job.status != ReportStatus::Completed {
            return Err(ReportError::validation(format!(
                "Only completed reports can be shared (status: {})",
                job.status
            )));
        }
        if request.max_downloads == Some(0) {
            return Err(ReportError::validation("max_downloads must be at least 1"));
        }
        if let Some(expires_at) = request.expires_at {
            if expires_at <= now {
                return Err(ReportError::validation("expires_at must be in the future"));
            }
        }

        let password_hash = match request.password.as_deref() {
            Some(password) => Some(
                hash_password(password)
                    .map_err(|e| ReportError::Generation(format!("password hashing failed: {}", e)))?,
            ),
            None => None,
        };

        let share = ReportShare::new(
            job.id,
            generate_share_token(),
            NewReportShare {
                share_type: request.share_type,
                recipient: request.recipient,
                permissions: request.permissions.unwrap_or_default(),
                password_hash,
                expires_at: request.expires_at,
                max_downloads: request.max_downloads,
                created_by: actor,
            },
            now,
        );
        self.stores.shares.insert_share(&share).await?;

        info!(
            share_id = %share.id,
            job_id = %job.id,
            share_type = share.share_type.as_str(),
            max_downloads = ?share.max_downloads,
            "Report share created"
        );
        Ok(share)
    }

    /// Validates a token and counts the access.
    ///
    /// A rejected token leaves the share untouched.
    pub async fn validate_access(
        &self,
        token: &str,
        password: Option<&str>,
    ) -> Result<ShareAccessGrant, ReportError> {
        self.authorize(token, password, ShareAction::View).await
    }

    /// Like [`Self::validate_access`], but also requires the share's
    /// permissions to allow `action`. The access is only counted once every
    /// check passed.
    pub async fn authorize(
        &self,
        token: &str,
        password: Option<&str>,
        action: ShareAction,
    ) -> Result<ShareAccessGrant, ReportError> {
        match self.check_access(token, password, action).await {
            Ok(grant) => {
                record_share_access("granted");
                Ok(grant)
            }
            Err(ReportError::ShareAccess(denial)) => {
                debug!(token = token_prefix(token), reason = denial.code(), ?action, "Share access denied");
                record_share_access(denial.code());
                Err(denial.into())
            }
            Err(e) => Err(e),
        }
    }

    async fn check_access(
        &self,
        token: &str,
        password: Option<&str>,
        action: ShareAction,
    ) -> Result<ShareAccessGrant, ReportError> {
        let now = Utc::now();
        let share = self
            .stores
            .shares
            .find_share_by_token(token)
            .await?
            .ok_or(ShareDenial::NotFound)?;

        share.check_validity(now)?;
        share.verify_password(password)?;
        if !share.permissions.allows(action) {
            return Err(ShareDenial::PermissionDenied.into());
        }

        let job_available = self
            .stores
            .jobs
            .find_job(share.job_id)
            .await?
            .map_or(false, |job| job.is_downloadable());
        if !job_available {
            return Err(ShareDenial::ArtifactUnavailable.into());
        }

        let share = match self.stores.shares.record_share_access(token, now).await? {
            Some(share) => share,
            None => return Err(self.current_denial(token).await?.into()),
        };

        Ok(ShareAccessGrant {
            share_id: share.id,
            job_id: share.job_id,
            permissions: share.permissions,
        })
    }

    /// Why a share that just failed an atomic update is no longer usable.
    async fn current_denial(&self, token: &str) -> Result<ShareDenial, ReportError> {
        let denial = match self.stores.shares.find_share_by_token(token).await? {
            None => ShareDenial::NotFound,
            Some(share) => share.check_validity(Utc::now()).err().unwrap_or(ShareDenial::Expired),
        };
        Ok(denial)
    }

    /// Counts a download against the share and the job metrics. The share
    /// expires once its download cap is reached.
    pub async fn record_download(&self, token: &str) -> Result<ReportShare, ReportError> {
        let now = Utc::now();
        let share = match self.stores.shares.record_share_download(token, now).await? {
            Some(share) => share,
            None => return Err(self.current_denial(token).await?.into()),
        };

        if let Err(e) = self.stores.metrics.record_download(share.job_id, now).await {
            warn!(job_id = %share.job_id, error = %e, "Failed to count report download");
        }
        if share.max_downloads.map_or(false, |max| share.download_count >= max) {
            info!(share_id = %share.id, job_id = %share.job_id, "Report share download limit reached");
        }
        Ok(share)
    }

    /// Validates the token, reads the artifact and counts the download.
    pub async fn download_via_share(
        &self,
        token: &str,
        password: Option<&str>,
    ) -> Result<ReportDownload, ReportError> {
        let grant = self.authorize(token, password, ShareAction::Download).await?;

        let job = self
            .stores
            .jobs
            .find_job(grant.job_id)
            .await?
            .filter(|job| job.is_downloadable())
            .ok_or(ShareDenial::ArtifactUnavailable)?;
        let location = job
            .artifact_location
            .as_deref()
            .ok_or(ShareDenial::ArtifactUnavailable)?;

        let bytes = match read_artifact(&self.storage, location).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Err(ShareDenial::ArtifactUnavailable.into()),
            Err(e) => return Err(e.into()),
        };
        self.record_download(token).await?;

        Ok(ReportDownload {
            bytes,
            content_type: job.format.content_type(),
            file_name: job.file_name(),
        })
    }

    /// Generation metrics of the shared report, for shares that allow it.
    pub async fn metrics_via_share(
        &self,
        token: &str,
        password: Option<&str>,
    ) -> Result<ReportMetrics, ReportError> {
        let grant = self.authorize(token, password, ShareAction::ViewMetrics).await?;
        self.stores
            .metrics
            .find_metrics(grant.job_id)
            .await?
            .ok_or_else(|| ReportError::not_found(format!("Metrics for report job {}", grant.job_id)))
    }

    /// Revokes a share. Revocation cannot be undone.
    pub async fn revoke(&self, token: &str) -> Result<ReportShare, ReportError> {
        let mut share = self
            .stores
            .shares
            .find_share_by_token(token)
            .await?
            .ok_or(ShareDenial::NotFound)?;
        share.revoke();
        self.stores.shares.update_share(&share).await?;

        info!(share_id = %share.id, job_id = %share.job_id, "Report share revoked");
        Ok(share)
    }

    pub async fn list_shares(&self, job_id: Uuid) -> Result<Vec<ReportShare>, ReportError> {
        if self.stores.jobs.find_job(job_id).await?.is_none() {
            return Err(ReportError::not_found(format!("Report job {}", job_id)));
        }
        Ok(self.stores.shares.list_shares_for_job(job_id).await?)
    }

    /// Shares every listed job with the same settings.
    pub async fn bulk_share(
        &self,
        job_ids: &[Uuid],
        request: CreateShareRequest,
        actor: Option<Uuid>,
    ) -> Result<BulkOutcome<ReportShare>, ReportError> {
        check_bulk_size(job_ids, self.max_bulk_items)?;
        request.validate()?;

        let mut outcome = BulkOutcome::new();
        for &job_id in job_ids {
            outcome.push(job_id, self.create_share(job_id, request.clone(), actor).await);
        }
        Ok(outcome)
    }
}
