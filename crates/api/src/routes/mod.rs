//! HTTP route handlers.

pub mod health;
pub mod report_schedules;
pub mod report_shares;
pub mod report_templates;
pub mod reports;

use axum::{
    body::Body,
    http::header,
    response::Response,
};
use serde::Serialize;
use shared::pagination::PageInfo;

use crate::error::ApiError;
use crate::services::ReportDownload;

/// List response with pagination metadata.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, pagination: PageInfo) -> Self {
        Self { data, pagination }
    }
}

/// Serves an artifact as a file attachment.
pub(crate) fn attachment(download: ReportDownload) -> Result<Response, ApiError> {
    let length = download.bytes.len();
    Response::builder()
        .header(header::CONTENT_TYPE, download.content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download.file_name),
        )
        .header(header::CONTENT_LENGTH, length)
        .body(Body::from(download.bytes))
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to build response");
            ApiError::Internal("Failed to build response".to_string())
        })
}
