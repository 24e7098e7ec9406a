//! Share link routes, addressed by token.
//!
//! A password-protected share expects the password in the
//! `X-Share-Password` header.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::routes::attachment;
use domain::models::{ReportMetrics, ShareAccessGrant};

pub const SHARE_PASSWORD_HEADER: &str = "x-share-password";

/// Create share router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:token", get(access_share).delete(revoke_share))
        .route("/:token/download", get(download_share))
        .route("/:token/metrics", get(share_metrics))
}

fn share_password(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SHARE_PASSWORD_HEADER)
        .and_then(|value| value.to_str().ok())
}

/// Validates a token and returns what it grants.
pub async fn access_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ShareAccessGrant>, ApiError> {
    let grant = state
        .shares
        .validate_access(&token, share_password(&headers))
        .await?;
    Ok(Json(grant))
}

pub async fn download_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let download = state
        .shares
        .download_via_share(&token, share_password(&headers))
        .await?;
    attachment(download)
}

/// Generation metrics of the shared report, for shares that allow it.
pub async fn share_metrics(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ReportMetrics>, ApiError> {
    let metrics = state
        .shares
        .metrics_via_share(&token, share_password(&headers))
        .await?;
    Ok(Json(metrics))
}

pub async fn revoke_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.shares.revoke(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_share_password_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(share_password(&headers), None);
        headers.insert(SHARE_PASSWORD_HEADER, HeaderValue::from_static("hunter22"));
        assert_eq!(share_password(&headers), Some("hunter22"));
    }
}
