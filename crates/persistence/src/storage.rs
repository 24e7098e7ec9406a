//! Artifact storage backends.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use domain::services::storage::validate_relative_path;
use domain::services::{ArtifactStorage, ArtifactWriter, StorageError};
use tracing::warn;
use uuid::Uuid;

/// Stores artifacts as files below a root directory.
///
/// Writes go to a `.partial` sibling that is renamed into place on commit;
/// a dropped writer removes its staging file.
#[derive(Debug, Clone)]
pub struct LocalArtifactStorage {
    root: PathBuf,
}

impl LocalArtifactStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        validate_relative_path(path)?;
        Ok(self.root.join(path))
    }
}

fn map_io(path: &str, err: io::Error) -> StorageError {
    if err.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        StorageError::io(path, err)
    }
}

struct LocalArtifactWriter {
    file: Option<File>,
    staged: PathBuf,
    target: PathBuf,
    path: String,
    written: u64,
}

impl Write for LocalArtifactWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "artifact writer already closed"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl ArtifactWriter for LocalArtifactWriter {
    fn commit(mut self: Box<Self>) -> Result<u64, StorageError> {
        let file = self
            .file
            .take()
            .ok_or_else(|| StorageError::Backend(format!("{} already committed", self.path)))?;
        file.sync_all().map_err(|e| StorageError::io(&self.path, e))?;
        drop(file);
        if let Err(e) = fs::rename(&self.staged, &self.target) {
            let _ = fs::remove_file(&self.staged);
            return Err(StorageError::io(&self.path, e));
        }
        Ok(self.written)
    }
}

impl Drop for LocalArtifactWriter {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            if let Err(e) = fs::remove_file(&self.staged) {
                warn!(path = %self.path, error = %e, "Failed to remove staged artifact");
            }
        }
    }
}

impl ArtifactStorage for LocalArtifactStorage {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    fn create(&self, path: &str) -> Result<Box<dyn ArtifactWriter>, StorageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(path, e))?;
        }
        let mut staged = target.clone().into_os_string();
        staged.push(format!(".{}.partial", Uuid::new_v4().simple()));
        let staged = PathBuf::from(staged);
        let file = File::create(&staged).map_err(|e| StorageError::io(path, e))?;

        Ok(Box::new(LocalArtifactWriter {
            file: Some(file),
            staged,
            target,
            path: path.to_string(),
            written: 0,
        }))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        fs::read(self.resolve(path)?).map_err(|e| map_io(path, e))
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        fs::remove_file(self.resolve(path)?).map_err(|e| map_io(path, e))
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.resolve(path)?.is_file())
    }
}

/// Keeps artifacts in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactStorage {
    artifacts: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_deletes: Arc<AtomicBool>,
    protected: Arc<Mutex<HashSet<String>>>,
}

impl InMemoryArtifactStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent delete fail with a backend error.
    pub fn set_delete_failure(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Makes deletes of `path` fail with a backend error.
    pub fn protect(&self, path: &str) {
        if let Ok(mut protected) = self.protected.lock() {
            protected.insert(path.to_string());
        }
    }

    fn is_protected(&self, path: &str) -> bool {
        self.protected
            .lock()
            .map_or(false, |protected| protected.contains(path))
    }

    /// Paths of all committed artifacts.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .artifacts
            .lock()
            .map(|artifacts| artifacts.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    fn with_artifacts<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Vec<u8>>) -> R,
    ) -> Result<R, StorageError> {
        let mut artifacts = self
            .artifacts
            .lock()
            .map_err(|_| StorageError::Backend("artifact map lock poisoned".to_string()))?;
        Ok(f(&mut artifacts))
    }
}

struct MemoryArtifactWriter {
    artifacts: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    path: String,
    buffer: Vec<u8>,
}

impl Write for MemoryArtifactWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ArtifactWriter for MemoryArtifactWriter {
    fn commit(self: Box<Self>) -> Result<u64, StorageError> {
        let MemoryArtifactWriter {
            artifacts,
            path,
            buffer,
        } = *self;
        let size = buffer.len() as u64;
        artifacts
            .lock()
            .map_err(|_| StorageError::Backend("artifact map lock poisoned".to_string()))?
            .insert(path, buffer);
        Ok(size)
    }
}

impl ArtifactStorage for InMemoryArtifactStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn create(&self, path: &str) -> Result<Box<dyn ArtifactWriter>, StorageError> {
        validate_relative_path(path)?;
        Ok(Box::new(MemoryArtifactWriter {
            artifacts: self.artifacts.clone(),
            path: path.to_string(),
            buffer: Vec::new(),
        }))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.with_artifacts(|artifacts| artifacts.get(path).cloned())?
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) || self.is_protected(path) {
            return Err(StorageError::Backend(format!("delete of {} refused", path)));
        }
        self.with_artifacts(|artifacts| artifacts.remove(path))?
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        self.with_artifacts(|artifacts| artifacts.contains_key(path))
    }
}
