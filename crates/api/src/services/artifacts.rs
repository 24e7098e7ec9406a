//! Artifact storage calls from async code.
//!
//! Storage backends do blocking I/O, so every call runs on the blocking
//! thread pool.

use std::sync::Arc;

use domain::services::{ArtifactStorage, StorageError};

async fn run_blocking<T, F>(storage: &Arc<dyn ArtifactStorage>, op: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce(&dyn ArtifactStorage) -> Result<T, StorageError> + Send + 'static,
{
    let storage = Arc::clone(storage);
    tokio::task::spawn_blocking(move || op(storage.as_ref()))
        .await
        .map_err(|e| StorageError::Backend(format!("storage worker stopped: {}", e)))?
}

pub(crate) async fn read_artifact(
    storage: &Arc<dyn ArtifactStorage>,
    path: &str,
) -> Result<Vec<u8>, StorageError> {
    let path = path.to_string();
    run_blocking(storage, move |storage| storage.read(&path)).await
}

/// Deletes an artifact, treating a missing one as already deleted.
pub(crate) async fn remove_artifact(
    storage: &Arc<dyn ArtifactStorage>,
    path: &str,
) -> Result<(), StorageError> {
    let path = path.to_string();
    run_blocking(storage, move |storage| match storage.delete(&path) {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    })
    .await
}
