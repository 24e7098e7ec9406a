//! Report template routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Actor;
use crate::routes::report_schedules::PageQuery;
use crate::routes::PaginatedResponse;
use domain::models::{CreateReportTemplateRequest, ReportTemplate};
use shared::pagination::PageRequest;

/// Create template router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_template).get(list_templates))
        .route("/:template_id", get(get_template))
}

pub async fn create_template(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateReportTemplateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let template = state.templates.create(request, actor.id()).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// Public templates plus the caller's own.
pub async fn list_templates(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaginatedResponse<ReportTemplate>>, ApiError> {
    let (templates, pagination) = state
        .templates
        .list(actor.id(), PageRequest::from(&query))
        .await?;
    Ok(Json(PaginatedResponse::new(templates, pagination)))
}

pub async fn get_template(
    State(state): State<AppState>,
    actor: Actor,
    Path(template_id): Path<Uuid>,
) -> Result<Json<ReportTemplate>, ApiError> {
    Ok(Json(state.templates.get(template_id, actor.id()).await?))
}
