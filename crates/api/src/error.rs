use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::models::ShareDenial;
use domain::services::{StorageError, StoreError};
use domain::ReportError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Validation error: {} invalid fields", .0.len())]
    InvalidFields(Vec<ValidationDetail>),

    #[error("Share access denied: {0}")]
    ShareDenied(ShareDenial),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<ValidationDetail>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationDetail {
    pub field: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg, None),
            ApiError::InvalidFields(details) => {
                let message = if details.len() == 1 {
                    details[0].message.clone()
                } else {
                    format!("{} validation errors", details.len())
                };
                (StatusCode::BAD_REQUEST, "validation_error", message, Some(details))
            }
            ApiError::ShareDenied(denial) => {
                let status = match denial {
                    ShareDenial::NotFound => StatusCode::NOT_FOUND,
                    _ => StatusCode::FORBIDDEN,
                };
                (status, denial.code(), denial.to_string(), None)
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg,
                None,
            ),
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::Validation(msg) => ApiError::Validation(msg),
            ReportError::Configuration(msg) => ApiError::Validation(msg),
            ReportError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            ReportError::ShareAccess(denial) => ApiError::ShareDenied(denial),
            ReportError::InvalidTransition(e) => ApiError::Conflict(e.to_string()),
            ReportError::Storage(e) => e.into(),
            ReportError::Store(e) => e.into(),
            ReportError::Generation(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => ApiError::NotFound("Report artifact not found".into()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| ValidationDetail {
                    field: field.to_string(),
                    message: e
                        .message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field)),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));

        ApiError::InvalidFields(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{ReportStatus, TransitionError};

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_api_error_status_codes() {
        let cases = [
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::Conflict("x".into()), StatusCode::CONFLICT),
            (ApiError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ApiError::ServiceUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ApiError::ShareDenied(ShareDenial::Revoked), StatusCode::FORBIDDEN),
            (ApiError::ShareDenied(ShareDenial::NotFound), StatusCode::NOT_FOUND),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_report_error_mapping() {
        assert!(matches!(
            ApiError::from(ReportError::validation("bad dates")),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            ApiError::from(ReportError::Configuration("no pdf".into())),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            ApiError::from(ReportError::not_found("Report job")),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(ReportError::from(TransitionError {
                from: ReportStatus::Completed,
                to: ReportStatus::Pending,
            })),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(ReportError::Storage(StorageError::NotFound("a.csv".into()))),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(ReportError::Store(StoreError::Database("down".into()))),
            ApiError::Internal(_)
        ));
    }

    #[tokio::test]
    async fn test_share_denial_body_uses_code() {
        let response = ApiError::ShareDenied(ShareDenial::DownloadLimitReached).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"], "share_exhausted");
        assert_eq!(body["message"], "share link download limit reached");
    }

    #[tokio::test]
    async fn test_internal_error_hides_message() {
        let body = body_json(ApiError::Internal("db password wrong".into()).into_response()).await;
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn test_invalid_fields_body_has_details() {
        let error = ApiError::InvalidFields(vec![
            ValidationDetail {
                field: "name".into(),
                message: "Name must be 1-120 characters".into(),
            },
            ValidationDetail {
                field: "run_time".into(),
                message: "run_time must be HH:MM or HH:MM:SS".into(),
            },
        ]);
        let body = body_json(error.into_response()).await;
        assert_eq!(body["message"], "2 validation errors");
        assert_eq!(body["details"].as_array().unwrap().len(), 2);
        assert!(body.get("details").is_some());
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(ApiError::NotFound("test".into()).to_string(), "Not found: test");
        assert_eq!(
            ApiError::ShareDenied(ShareDenial::Expired).to_string(),
            "Share access denied: share link has expired"
        );
    }
}
