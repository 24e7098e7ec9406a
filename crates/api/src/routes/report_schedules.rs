//! Report schedule routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Actor;
use crate::routes::PaginatedResponse;
use crate::services::ScheduleExecution;
use domain::models::{CreateReportScheduleRequest, ReportSchedule};
use shared::pagination::PageRequest;

/// Create schedule router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_schedule).get(list_schedules))
        .route("/:schedule_id", get(get_schedule))
        .route("/:schedule_id/run", post(run_schedule_now))
        .route("/:schedule_id/pause", post(pause_schedule))
        .route("/:schedule_id/resume", post(resume_schedule))
        .route("/:schedule_id/disable", post(disable_schedule))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl From<&PageQuery> for PageRequest {
    fn from(query: &PageQuery) -> Self {
        PageRequest::new(query.page, query.per_page)
    }
}

pub async fn create_schedule(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateReportScheduleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let schedule = state.schedules.create_schedule(request, actor.id()).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

pub async fn list_schedules(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaginatedResponse<ReportSchedule>>, ApiError> {
    let (schedules, pagination) = state.schedules.list(PageRequest::from(&query)).await?;
    Ok(Json(PaginatedResponse::new(schedules, pagination)))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<ReportSchedule>, ApiError> {
    Ok(Json(state.schedules.get(schedule_id).await?))
}

/// Fires the schedule now and waits for the generated report.
pub async fn run_schedule_now(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<ScheduleExecution>, ApiError> {
    Ok(Json(state.schedules.run_now(schedule_id).await?))
}

pub async fn pause_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<ReportSchedule>, ApiError> {
    Ok(Json(state.schedules.pause(schedule_id).await?))
}

pub async fn resume_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<ReportSchedule>, ApiError> {
    Ok(Json(state.schedules.resume(schedule_id).await?))
}

pub async fn disable_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<ReportSchedule>, ApiError> {
    Ok(Json(state.schedules.disable(schedule_id).await?))
}
