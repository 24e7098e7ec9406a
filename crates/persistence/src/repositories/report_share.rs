//! Report share repository.

use chrono::{DateTime, Utc};
use domain::models::ReportShare;
use domain::services::{ReportShareStore, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

use super::db_err;
use crate::entities::{ReportShareEntity, REPORT_SHARE_COLUMNS};
use crate::metrics::QueryTimer;

/// PostgreSQL-backed [`ReportShareStore`].
#[derive(Clone)]
pub struct ReportShareRepository {
    pool: PgPool,
}

impl ReportShareRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn update_returning(
        &self,
        query_name: &'static str,
        set_and_where: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ReportShare>, StoreError> {
        let timer = QueryTimer::new(query_name);
        let sql = format!(
            "UPDATE report_shares {} RETURNING {}",
            set_and_where, REPORT_SHARE_COLUMNS
        );
        let result = sqlx::query_as::<_, ReportShareEntity>(&sql)
            .bind(token)
            .bind(now)
            .fetch_optional(&self.pool)
            .await;
        timer.record();

        result.map_err(db_err)?.map(ReportShareEntity::into_domain).transpose()
    }
}

#[async_trait::async_trait]
impl ReportShareStore for ReportShareRepository {
    async fn insert_share(&self, share: &ReportShare) -> Result<(), StoreError> {
        let timer = QueryTimer::new("insert_report_share");
        let sql = format!(
            "INSERT INTO report_shares ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
            REPORT_SHARE_COLUMNS
        );
        let result = sqlx::query(&sql)
            .bind(share.id)
            .bind(share.job_id)
            .bind(&share.token)
            .bind(share.share_type.as_str())
            .bind(&share.recipient)
            .bind(share.permissions.can_download)
            .bind(share.permissions.can_view_metrics)
            .bind(&share.password_hash)
            .bind(share.expires_at)
            .bind(share.max_downloads.map(|m| m as i32))
            .bind(share.status.as_str())
            .bind(share.access_count as i64)
            .bind(share.download_count as i32)
            .bind(share.last_accessed)
            .bind(share.created_by)
            .bind(share.created_at)
            .execute(&self.pool)
            .await;
        timer.record();

        result.map_err(db_err)?;
        Ok(())
    }

    async fn find_share_by_token(&self, token: &str) -> Result<Option<ReportShare>, StoreError> {
        let timer = QueryTimer::new("find_report_share_by_token");
        let sql = format!("SELECT {} FROM report_shares WHERE token = $1", REPORT_SHARE_COLUMNS);
        let result = sqlx::query_as::<_, ReportShareEntity>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await;
        timer.record();

        result.map_err(db_err)?.map(ReportShareEntity::into_domain).transpose()
    }

    async fn update_share(&self, share: &ReportShare) -> Result<(), StoreError> {
        let timer = QueryTimer::new("update_report_share");
        let result = sqlx::query(
            r#"
            UPDATE report_shares
            SET status = $2, access_count = $3, download_count = $4, last_accessed = $5
            WHERE id = $1
            "#,
        )
        .bind(share.id)
        .bind(share.status.as_str())
        .bind(share.access_count as i64)
        .bind(share.download_count as i32)
        .bind(share.last_accessed)
        .execute(&self.pool)
        .await;
        timer.record();

        result.map_err(db_err)?;
        Ok(())
    }

    async fn list_shares_for_job(&self, job_id: Uuid) -> Result<Vec<ReportShare>, StoreError> {
        let timer = QueryTimer::new("list_report_shares");
        let sql = format!(
            "SELECT {} FROM report_shares WHERE job_id = $1 ORDER BY created_at DESC",
            REPORT_SHARE_COLUMNS
        );
        let result = sqlx::query_as::<_, ReportShareEntity>(&sql)
            .bind(job_id)
            .fetch_all(&self.pool)
            .await;
        timer.record();

        result
            .map_err(db_err)?
            .into_iter()
            .map(ReportShareEntity::into_domain)
            .collect()
    }

    async fn record_share_access(&self, token: &str, now: DateTime<Utc>) -> Result<Option<ReportShare>, StoreError> {
        self.update_returning(
            "record_report_share_access",
            "SET access_count = access_count + 1, last_accessed = $2 \
             WHERE token = $1 AND status = 'active'",
            token,
            now,
        )
        .await
    }

    async fn record_share_download(&self, token: &str, now: DateTime<Utc>) -> Result<Option<ReportShare>, StoreError> {
        // SET expressions see the pre-update row, so `download_count + 1` is
        // the new count.
        self.update_returning(
            "record_report_share_download",
            "SET download_count = download_count + 1, last_accessed = $2, \
                 status = CASE WHEN max_downloads IS NOT NULL AND download_count + 1 >= max_downloads \
                          THEN 'expired' ELSE status END \
             WHERE token = $1 AND status = 'active' \
               AND (max_downloads IS NULL OR download_count < max_downloads) \
               AND (expires_at IS NULL OR expires_at > $2)",
            token,
            now,
        )
        .await
    }
}
