//! Artifact storage abstraction.
//!
//! Artifacts are addressed by a relative, `/`-separated path. Writes are
//! staged: nothing is visible under the final path until
//! [`ArtifactWriter::commit`] succeeds, and dropping an uncommitted writer
//! discards the staged bytes.

use std::io::Write;
use thiserror::Error;

use crate::models::ReportJob;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("invalid artifact path: {0}")]
    InvalidPath(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Staged artifact being written.
pub trait ArtifactWriter: Write + Send {
    /// Publishes the staged bytes under the final path and returns the
    /// artifact size.
    fn commit(self: Box<Self>) -> Result<u64, StorageError>;
}

/// Write/read/delete-by-path capability. Implementations are synchronous and
/// are called from blocking worker threads.
pub trait ArtifactStorage: Send + Sync {
    fn backend_name(&self) -> &'static str;

    fn create(&self, path: &str) -> Result<Box<dyn ArtifactWriter>, StorageError>;

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Removes the artifact. A missing artifact is reported as
    /// [`StorageError::NotFound`].
    fn delete(&self, path: &str) -> Result<(), StorageError>;

    fn exists(&self, path: &str) -> Result<bool, StorageError>;
}

/// Storage path for a job's artifact: `<report_type>/<yyyy>/<mm>/<job_id>.<ext>`.
pub fn artifact_path(job: &ReportJob) -> String {
    format!(
        "{}/{}/{}.{}",
        job.report_type.as_str(),
        job.created_at.format("%Y/%m"),
        job.id,
        job.format.extension()
    )
}

/// Rejects absolute paths, parent references and empty segments.
pub fn validate_relative_path(path: &str) -> Result<(), StorageError> {
    let invalid = || StorageError::InvalidPath(path.to_string());
    if path.is_empty() || path.starts_with('/') || path.contains('\\') || path.contains(':') {
        return Err(invalid());
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid());
    }
    Ok(())
}
