//! Trained artifact storage.
//!
//! One blob per model id at `<dir>/<model_id>.artifact`. Writes go to a unique
//! temp file in the same directory and are renamed over the target, so a
//! reader sees either the old artifact or the new one, never a partial file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use doodle_core::ModelId;
use thiserror::Error;

const ARTIFACT_EXTENSION: &str = "artifact";

/// Errors from the artifact store.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Filesystem failure.
    #[error("Artifact I/O error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl ArtifactError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Filesystem store for trained artifacts, keyed by model id.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `dir`. The directory is created lazily.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of a model's artifact.
    #[must_use]
    pub fn path_for(&self, model_id: ModelId) -> PathBuf {
        self.dir.join(format!("{model_id}.{ARTIFACT_EXTENSION}"))
    }

    /// Whether an artifact exists for the model.
    #[must_use]
    pub fn exists(&self, model_id: ModelId) -> bool {
        self.path_for(model_id).is_file()
    }

    /// Read a model's artifact, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn read(&self, model_id: ModelId) -> Result<Option<Vec<u8>>, ArtifactError> {
        let path = self.path_for(model_id);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArtifactError::io(&path, e)),
        }
    }

    /// Atomically replace a model's artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp file cannot be written or renamed. The
    /// previous artifact, if any, is left in place.
    pub fn write(&self, model_id: ModelId, bytes: &[u8]) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.dir).map_err(|e| ArtifactError::io(&self.dir, e))?;
        let target = self.path_for(model_id);
        let temp = self
            .dir
            .join(format!(".{model_id}.{}.tmp", uuid::Uuid::new_v4().simple()));

        if let Err(e) = fs::write(&temp, bytes) {
            let _ = fs::remove_file(&temp);
            return Err(ArtifactError::io(&temp, e));
        }
        if let Err(e) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            return Err(ArtifactError::io(&target, e));
        }
        tracing::debug!(model_id = %model_id, bytes = bytes.len(), "Artifact written");
        Ok(())
    }

    /// Delete a model's artifact. Returns false if there was none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn delete(&self, model_id: ModelId) -> Result<bool, ArtifactError> {
        let path = self.path_for(model_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ArtifactError::io(&path, e)),
        }
    }

    /// Model ids that currently have an artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be listed.
    pub fn list(&self) -> Result<Vec<ModelId>, ArtifactError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArtifactError::io(&self.dir, e)),
        };
        let mut ids: Vec<ModelId> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == ARTIFACT_EXTENSION))
            .filter_map(|path| path.file_stem()?.to_str()?.parse().ok())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
