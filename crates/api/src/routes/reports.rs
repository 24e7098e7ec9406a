//! Report job routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Actor;
use crate::routes::{attachment, PaginatedResponse};
use domain::models::{
    CreateReportJobRequest, CreateShareRequest, ExportFormat, ReportJobFilter, ReportJobResponse,
    ReportMetrics, ReportShare, ReportStatus, ReportType,
};
use shared::pagination::PageRequest;

/// Create report job router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_report).get(list_reports))
        .route("/bulk/delete", post(bulk_delete))
        .route("/bulk/regenerate", post(bulk_regenerate))
        .route("/bulk/share", post(bulk_share))
        .route("/:job_id", get(get_report).delete(delete_report))
        .route("/:job_id/metrics", get(get_report_metrics))
        .route("/:job_id/download", get(download_report))
        .route("/:job_id/regenerate", post(regenerate_report))
        .route("/:job_id/shares", post(create_share).get(list_shares))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListReportsQuery {
    pub status: Option<ReportStatus>,
    pub report_type: Option<ReportType>,
    pub format: Option<ExportFormat>,
    pub created_by: Option<Uuid>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl From<ListReportsQuery> for ReportJobFilter {
    fn from(query: ListReportsQuery) -> Self {
        ReportJobFilter {
            status: query.status,
            report_type: query.report_type,
            format: query.format,
            created_by: query.created_by,
            created_after: query.created_after,
            created_before: query.created_before,
            page: PageRequest::new(query.page, query.per_page),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkJobsRequest {
    pub job_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct BulkShareRequest {
    pub job_ids: Vec<Uuid>,
    #[serde(default)]
    pub share: CreateShareRequest,
}

/// Queue a new report job. Generation happens in the background.
pub async fn create_report(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateReportJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.reports.create(request, actor.id()).await?;
    Ok((StatusCode::ACCEPTED, Json(ReportJobResponse::from(job))))
}

pub async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ListReportsQuery>,
) -> Result<Json<PaginatedResponse<ReportJobResponse>>, ApiError> {
    let filter = ReportJobFilter::from(query);
    let (jobs, pagination) = state.reports.list(&filter).await?;
    let data = jobs.into_iter().map(ReportJobResponse::from).collect();
    Ok(Json(PaginatedResponse::new(data, pagination)))
}

/// Status and progress of one job.
pub async fn get_report(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ReportJobResponse>, ApiError> {
    Ok(Json(state.reports.get(job_id).await?.into()))
}

pub async fn get_report_metrics(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ReportMetrics>, ApiError> {
    Ok(Json(state.reports.metrics(job_id).await?))
}

pub async fn download_report(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    attachment(state.reports.download(job_id).await?)
}

pub async fn regenerate_report(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.reports.regenerate(job_id).await?;
    Ok((StatusCode::ACCEPTED, Json(ReportJobResponse::from(job))))
}

pub async fn delete_report(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.reports.delete(job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_share(
    State(state): State<AppState>,
    actor: Actor,
    Path(job_id): Path<Uuid>,
    Json(request): Json<CreateShareRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let share = state.shares.create_share(job_id, request, actor.id()).await?;
    Ok((StatusCode::CREATED, Json(share)))
}

pub async fn list_shares(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Vec<ReportShare>>, ApiError> {
    Ok(Json(state.shares.list_shares(job_id).await?))
}

pub async fn bulk_delete(
    State(state): State<AppState>,
    Json(request): Json<BulkJobsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.reports.bulk_delete(&request.job_ids).await?))
}

pub async fn bulk_regenerate(
    State(state): State<AppState>,
    Json(request): Json<BulkJobsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.reports.bulk_regenerate(&request.job_ids).await?))
}

pub async fn bulk_share(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<BulkShareRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .shares
        .bulk_share(&request.job_ids, request.share, actor.id())
        .await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_into_filter() {
        let query: ListReportsQuery = serde_json::from_value(serde_json::json!({
            "status": "completed",
            "report_type": "venue_utilization",
            "per_page": 500
        }))
        .unwrap();
        let filter = ReportJobFilter::from(query);
        assert_eq!(filter.status, Some(ReportStatus::Completed));
        assert_eq!(filter.report_type, Some(ReportType::VenueUtilization));
        assert_eq!(filter.page.page, 1);
        assert_eq!(filter.page.per_page, shared::pagination::MAX_PER_PAGE);
    }

    #[test]
    fn test_bulk_share_request_defaults() {
        let request: BulkShareRequest = serde_json::from_value(serde_json::json!({
            "job_ids": [Uuid::nil()]
        }))
        .unwrap();
        assert_eq!(request.job_ids.len(), 1);
        assert!(request.share.max_downloads.is_none());
    }
}
