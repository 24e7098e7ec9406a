//! Share links for completed reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareType {
    #[default]
    Link,
    Email,
    Api,
}

impl ShareType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareType::Link => "link",
            ShareType::Email => "email",
            ShareType::Api => "api",
        }
    }
}

impl FromStr for ShareType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "link" => Ok(ShareType::Link),
            "email" => Ok(ShareType::Email),
            "api" => Ok(ShareType::Api),
            _ => Err(format!("Unknown share type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareStatus {
    Active,
    Expired,
    Revoked,
}

impl ShareStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareStatus::Active => "active",
            ShareStatus::Expired => "expired",
            ShareStatus::Revoked => "revoked",
        }
    }
}

impl FromStr for ShareStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ShareStatus::Active),
            "expired" => Ok(ShareStatus::Expired),
            "revoked" => Ok(ShareStatus::Revoked),
            _ => Err(format!("Unknown share status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SharePermissions {
    pub can_download: bool,
    pub can_view_metrics: bool,
}

impl Default for SharePermissions {
    fn default() -> Self {
        Self {
            can_download: true,
            can_view_metrics: false,
        }
    }
}

/// What a share token is being used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareAction {
    View,
    Download,
    ViewMetrics,
}

impl SharePermissions {
    pub fn allows(&self, action: ShareAction) -> bool {
        match action {
            ShareAction::View => true,
            ShareAction::Download => self.can_download,
            ShareAction::ViewMetrics => self.can_view_metrics,
        }
    }
}

/// Why a share token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShareDenial {
    #[error("share link not found")]
    NotFound,
    #[error("share link has been revoked")]
    Revoked,
    #[error("share link has expired")]
    Expired,
    #[error("share link download limit reached")]
    DownloadLimitReached,
    #[error("share link requires a password")]
    PasswordRequired,
    #[error("share link password is incorrect")]
    InvalidPassword,
    #[error("share link does not grant this permission")]
    PermissionDenied,
    #[error("shared report is no longer available")]
    ArtifactUnavailable,
}

impl ShareDenial {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ShareDenial::NotFound => "share_not_found",
            ShareDenial::Revoked => "share_revoked",
            ShareDenial::Expired => "share_expired",
            ShareDenial::DownloadLimitReached => "share_exhausted",
            ShareDenial::PasswordRequired => "share_password_required",
            ShareDenial::InvalidPassword => "share_password_invalid",
            ShareDenial::PermissionDenied => "share_permission_denied",
            ShareDenial::ArtifactUnavailable => "share_artifact_unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportShare {
    pub id: Uuid,
    pub job_id: Uuid,
    pub token: String,
    pub share_type: ShareType,
    pub recipient: Option<String>,
    pub permissions: SharePermissions,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_downloads: Option<u32>,
    pub status: ShareStatus,
    pub access_count: u64,
    pub download_count: u32,
    pub last_accessed: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a share.
#[derive(Debug, Clone, Default)]
pub struct NewReportShare {
    pub share_type: ShareType,
    pub recipient: Option<String>,
    pub permissions: SharePermissions,
    pub password_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_downloads: Option<u32>,
    pub created_by: Option<Uuid>,
}

impl ReportShare {
    pub fn new(job_id: Uuid, token: String, input: NewReportShare, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            token,
            share_type: input.share_type,
            recipient: input.recipient,
            permissions: input.permissions,
            password_hash: input.password_hash,
            expires_at: input.expires_at,
            max_downloads: input.max_downloads,
            status: ShareStatus::Active,
            access_count: 0,
            download_count: 0,
            last_accessed: None,
            created_by: input.created_by,
            created_at: now,
        }
    }

    fn download_limit_reached(&self) -> bool {
        self.max_downloads
            .map_or(false, |max| self.download_count >= max)
    }

    /// Checks status, expiry and download cap. Does not modify the share.
    pub fn check_validity(&self, now: DateTime<Utc>) -> Result<(), ShareDenial> {
        if self.status == ShareStatus::Revoked {
            return Err(ShareDenial::Revoked);
        }
        if self.download_limit_reached() {
            return Err(ShareDenial::DownloadLimitReached);
        }
        if self.status == ShareStatus::Expired {
            return Err(ShareDenial::Expired);
        }
        if self.expires_at.map_or(false, |expires| expires <= now) {
            return Err(ShareDenial::Expired);
        }
        Ok(())
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.check_validity(now).is_ok()
    }

    pub fn is_password_protected(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Checks the supplied password against the stored hash.
    pub fn verify_password(&self, password: Option<&str>) -> Result<(), ShareDenial> {
        let Some(hash) = &self.password_hash else {
            return Ok(());
        };
        let Some(password) = password else {
            return Err(ShareDenial::PasswordRequired);
        };
        match shared::password::verify_password(password, hash) {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(ShareDenial::InvalidPassword),
        }
    }

    pub fn record_access(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed = Some(now);
    }

    /// Counts a download. Returns `true` when this download used up the
    /// last allowed one, in which case the share is now EXPIRED.
    pub fn record_download(&mut self, now: DateTime<Utc>) -> bool {
        self.download_count += 1;
        self.last_accessed = Some(now);
        if self.status == ShareStatus::Active && self.download_limit_reached() {
            self.status = ShareStatus::Expired;
            return true;
        }
        false
    }

    pub fn revoke(&mut self) {
        self.status = ShareStatus::Revoked;
    }
}

/// Permissions granted by a successful share validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ShareAccessGrant {
    pub share_id: Uuid,
    pub job_id: Uuid,
    pub permissions: SharePermissions,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateShareRequest {
    #[serde(default)]
    pub share_type: ShareType,
    #[validate(email(message = "Recipient must be a valid email address"))]
    pub recipient: Option<String>,
    pub permissions: Option<SharePermissions>,
    pub expires_at: Option<DateTime<Utc>>,
    #[validate(range(min = 1, message = "max_downloads must be at least 1"))]
    pub max_downloads: Option<u32>,
    #[validate(length(min = 4, max = 128, message = "Password must be 4-128 characters"))]
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn share(input: NewReportShare) -> ReportShare {
        ReportShare::new(Uuid::new_v4(), "token".into(), input, Utc::now())
    }

    #[test]
    fn test_permissions_allow_actions() {
        let view_only = SharePermissions {
            can_download: false,
            can_view_metrics: false,
        };
        assert!(view_only.allows(ShareAction::View));
        assert!(!view_only.allows(ShareAction::Download));
        assert!(!view_only.allows(ShareAction::ViewMetrics));
        assert!(SharePermissions::default().allows(ShareAction::Download));
    }

    #[test]
    fn test_default_share_is_valid() {
        let s = share(NewReportShare::default());
        assert!(s.is_valid(Utc::now()));
        assert!(s.permissions.can_download);
        assert!(!s.permissions.can_view_metrics);
    }

    #[test]
    fn test_expired_by_time() {
        let now = Utc::now();
        let s = share(NewReportShare {
            expires_at: Some(now - Duration::minutes(1)),
            ..Default::default()
        });
        assert_eq!(s.check_validity(now), Err(ShareDenial::Expired));
        assert_eq!(s.status, ShareStatus::Active);
    }

    #[test]
    fn test_download_cap_expires_share() {
        let now = Utc::now();
        let mut s = share(NewReportShare {
            max_downloads: Some(2),
            ..Default::default()
        });
        assert!(!s.record_download(now));
        assert!(s.is_valid(now));
        assert!(s.record_download(now));
        assert_eq!(s.status, ShareStatus::Expired);
        assert_eq!(s.check_validity(now), Err(ShareDenial::DownloadLimitReached));
    }

    #[test]
    fn test_revoked_wins() {
        let mut s = share(NewReportShare {
            max_downloads: Some(1),
            ..Default::default()
        });
        s.record_download(Utc::now());
        s.revoke();
        assert_eq!(s.check_validity(Utc::now()), Err(ShareDenial::Revoked));
    }

    #[test]
    fn test_password_check() {
        let hash = shared::password::hash_password("letmein").unwrap();
        let s = share(NewReportShare {
            password_hash: Some(hash),
            ..Default::default()
        });
        assert_eq!(s.verify_password(None), Err(ShareDenial::PasswordRequired));
        assert_eq!(s.verify_password(Some("nope")), Err(ShareDenial::InvalidPassword));
        assert_eq!(s.verify_password(Some("letmein")), Ok(()));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let s = share(NewReportShare {
            password_hash: Some("$argon2id$fake".into()),
            ..Default::default()
        });
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn test_create_request_validation() {
        let request = CreateShareRequest {
            max_downloads: Some(0),
            ..Default::default()
        };
        assert!(request.validate().is_err());

        let request = CreateShareRequest {
            recipient: Some("not-an-email".into()),
            ..Default::default()
        };
        assert!(request.validate().is_err());

        assert!(CreateShareRequest::default().validate().is_ok());
    }
}
