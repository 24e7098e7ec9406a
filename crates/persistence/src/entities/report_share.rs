//! Report share entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{ReportShare, SharePermissions};
use domain::services::StoreError;
use sqlx::FromRow;
use uuid::Uuid;

use super::{non_negative, parse_column};

pub const REPORT_SHARE_COLUMNS: &str = "id, job_id, token, share_type, recipient, can_download, \
    can_view_metrics, password_hash, expires_at, max_downloads, status, access_count, \
    download_count, last_accessed, created_by, created_at";

/// Database row mapping for the report_shares table.
#[derive(Debug, Clone, FromRow)]
pub struct ReportShareEntity {
    pub id: Uuid,
    pub job_id: Uuid,
    /// Unique, URL-safe share token.
    pub token: String,
    pub share_type: String,
    pub recipient: Option<String>,
    pub can_download: bool,
    pub can_view_metrics: bool,
    /// Argon2id PHC string.
    pub password_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_downloads: Option<i32>,
    pub status: String,
    pub access_count: i64,
    pub download_count: i32,
    pub last_accessed: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ReportShareEntity {
    /// Convert to domain model.
    pub fn into_domain(self) -> Result<ReportShare, StoreError> {
        Ok(ReportShare {
            id: self.id,
            job_id: self.job_id,
            token: self.token,
            share_type: parse_column("report_shares.share_type", &self.share_type)?,
            recipient: self.recipient,
            permissions: SharePermissions {
                can_download: self.can_download,
                can_view_metrics: self.can_view_metrics,
            },
            password_hash: self.password_hash,
            expires_at: self.expires_at,
            max_downloads: self.max_downloads.map(|m| m.max(0) as u32),
            status: parse_column("report_shares.status", &self.status)?,
            access_count: non_negative(self.access_count),
            download_count: self.download_count.max(0) as u32,
            last_accessed: self.last_accessed,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}
