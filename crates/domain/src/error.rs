//! Report engine error taxonomy.

use thiserror::Error;

use crate::models::{ShareDenial, TransitionError};
use crate::services::storage::StorageError;
use crate::services::store::StoreError;

/// Errors surfaced by the report engine.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Bad parameters or request input. Raised before a job reaches GENERATING.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Failure inside an adapter or export strategy.
    #[error("Generation error: {0}")]
    Generation(String),

    /// Unsupported export format or missing capability. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Share access denied: {0}")]
    ShareAccess(ShareDenial),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ReportError {
    pub fn validation(message: impl Into<String>) -> Self {
        ReportError::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ReportError::NotFound(what.into())
    }
}

impl From<ShareDenial> for ReportError {
    fn from(denial: ShareDenial) -> Self {
        ReportError::ShareAccess(denial)
    }
}

impl From<validator::ValidationErrors> for ReportError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        ReportError::Validation(messages.join("; "))
    }
}
