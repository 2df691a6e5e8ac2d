//! Store and training service wired together.
//!
//! [`DoodleEngine`] owns the cross-service rules that neither service can
//! enforce alone: deleting a model deletes its artifact, a successful training
//! run stamps the model's last-trained date, and backups carry artifacts
//! alongside the store collections.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use doodle_core::{BackupBundle, Drawing, ModelId, ModelInfo, SampleStore, StoreError};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::artifact::ArtifactError;
use crate::classifier::{Classifier, Prediction};
use crate::recognition::RecognitionConfig;
use crate::session::{DrawingSource, RecognitionEvent, RecognitionHandle, RecognitionSession};
use crate::training::{TrainingConfig, TrainingError, TrainingReport, TrainingService};

/// Subdirectory of the data directory holding artifacts.
pub const ARTIFACT_DIR_NAME: &str = "artifacts";

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Training failure.
    #[error(transparent)]
    Training(#[from] TrainingError),

    /// Artifact storage failure.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// There is no active model to operate on.
    #[error("No active model")]
    NoActiveModel,
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// The sample store and training service, constructed together.
#[derive(Debug, Clone)]
pub struct DoodleEngine {
    store: SampleStore,
    training: TrainingService,
}

impl DoodleEngine {
    /// Combine an existing store and training service.
    #[must_use]
    pub fn new(store: SampleStore, training: TrainingService) -> Self {
        Self { store, training }
    }

    /// Open persisted state in `data_dir`, with artifacts under
    /// `<data_dir>/artifacts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be created.
    pub fn open(
        data_dir: impl AsRef<Path>,
        classifier: Arc<dyn Classifier>,
    ) -> EngineResult<Self> {
        let data_dir = data_dir.as_ref();
        let store = SampleStore::open(data_dir)?;
        let training = TrainingService::new(
            TrainingConfig::new(Self::artifact_dir(data_dir)),
            classifier,
        );
        tracing::info!(data_dir = %data_dir.display(), "Engine opened");
        Ok(Self::new(store, training))
    }

    /// Artifact directory for a data directory.
    #[must_use]
    pub fn artifact_dir(data_dir: &Path) -> PathBuf {
        data_dir.join(ARTIFACT_DIR_NAME)
    }

    /// The sample store.
    #[must_use]
    pub const fn store(&self) -> &SampleStore {
        &self.store
    }

    /// The training service.
    #[must_use]
    pub const fn training(&self) -> &TrainingService {
        &self.training
    }

    /// The active model.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoActiveModel`] if there are no models.
    pub fn active_model(&self) -> EngineResult<ModelInfo> {
        self.store.active_model().ok_or(EngineError::NoActiveModel)
    }

    /// Train a model from all of its samples and stamp its last-trained date.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ModelNotFound`] for an unknown model, or the
    /// training error.
    pub async fn train_model(&self, model_id: ModelId) -> EngineResult<TrainingReport> {
        if self.store.model(model_id).is_none() {
            return Err(StoreError::ModelNotFound(model_id).into());
        }
        let samples = self.store.samples_for_model(model_id);
        let report = self.training.train(&samples, model_id).await?;
        self.store.mark_trained(model_id, report.finished_at)?;
        Ok(report)
    }

    /// Train the active model.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoActiveModel`] or the training error.
    pub async fn train_active(&self) -> EngineResult<TrainingReport> {
        let model = self.active_model()?;
        self.train_model(model.id).await
    }

    /// Recognize a drawing with a model, or with the active model.
    pub async fn recognize(
        &self,
        drawing: &Drawing,
        model_id: Option<ModelId>,
    ) -> Option<Prediction> {
        let model_id = match model_id {
            Some(id) => id,
            None => self.store.active_model()?.id,
        };
        self.training.infer(drawing, model_id).await
    }

    /// Remove a model with its samples, labels, and artifact.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ModelNotFound`] for an unknown model. An
    /// artifact that cannot be deleted is logged and left behind.
    pub fn remove_model(&self, model_id: ModelId) -> EngineResult<ModelInfo> {
        let removed = self.store.remove_model(model_id)?;
        if let Err(e) = self.training.delete_artifact(model_id) {
            tracing::warn!(model_id = %model_id, error = %e, "Failed to delete artifact");
        }
        Ok(removed)
    }

    /// Snapshot the store and every model's artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if an artifact exists but cannot be read.
    pub fn export_backup(&self) -> EngineResult<BackupBundle> {
        let mut artifacts = Vec::new();
        for model in self.store.models() {
            if let Some(bytes) = self.training.read_artifact(model.id)? {
                artifacts.push((model.id, bytes));
            }
        }
        Ok(self.store.export_backup(artifacts))
    }

    /// Replace all state with a backup, including artifacts.
    ///
    /// Artifacts of models not in the bundle are deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle is unsupported or corrupt (nothing is
    /// changed), or if installing an artifact fails.
    pub fn restore_backup(&self, bundle: &BackupBundle) -> EngineResult<()> {
        let artifacts = self.store.restore_backup(bundle)?;
        for stale in self.training.artifacts().list()? {
            if !artifacts.iter().any(|(id, _)| *id == stale) {
                self.training.delete_artifact(stale)?;
            }
        }
        for (model_id, bytes) in &artifacts {
            self.training.write_artifact(*model_id, bytes)?;
        }
        Ok(())
    }

    /// Start live recognition on a canvas with the active model.
    ///
    /// Accepted recognitions are recorded in the store.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoActiveModel`] if there are no models.
    pub fn start_recognition<S: DrawingSource>(
        &self,
        source: Arc<S>,
        config: RecognitionConfig,
    ) -> EngineResult<(RecognitionHandle, mpsc::Receiver<RecognitionEvent>)> {
        let model = self.active_model()?;
        Ok(RecognitionSession::new(self.training.clone(), source, model.id)
            .with_config(config)
            .with_store(self.store.clone())
            .spawn())
    }
}
