//! Training pipeline and inference.
//!
//! [`TrainingService`] turns labeled samples into a trained artifact keyed by
//! model id and runs single-drawing inference against it. A run goes through
//! four stages, publishing progress on a watch channel as it goes:
//!
//! ```text
//! Validating ──► Featurizing ──► Fitting ──► Persisting
//!   (no I/O)     (rasterize)    (classifier)  (atomic swap)
//! ```
//!
//! Featurization and fitting are CPU bound and run on the blocking pool. A
//! failure at any stage leaves the previous artifact untouched and returns
//! the status to idle.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use doodle_core::{now_ms, Drawing, ModelId, SampleId, TrainingSample};
use doodle_renderer::{FeatureTensor, RasterConfig, Rasterizer, RenderError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::artifact::{ArtifactError, ArtifactStore};
use crate::classifier::{Classifier, ClassifierError, Prediction};
use crate::dataset::LabeledDataset;

/// Minimum samples a training run needs.
pub const MIN_TRAINING_SAMPLES: usize = 2;

/// Minimum distinct emoji labels a training run needs.
pub const MIN_TRAINING_LABELS: usize = 2;

/// Status error recorded when a training run is dropped mid-flight.
pub const RUN_INTERRUPTED: &str = "Training was interrupted before it finished";

/// Errors that abort a training run.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// Fewer samples than [`MIN_TRAINING_SAMPLES`].
    #[error("need at least {MIN_TRAINING_SAMPLES} samples to train, found {found}")]
    InsufficientSamples {
        /// Samples supplied.
        found: usize,
    },

    /// Fewer distinct labels than [`MIN_TRAINING_LABELS`].
    #[error("need at least 2 different emoji labels, found {found}")]
    InsufficientLabels {
        /// Distinct labels supplied.
        found: usize,
    },

    /// Another run is in progress.
    #[error("a training run is already in progress")]
    AlreadyTraining,

    /// A sample could not be rasterized.
    #[error("failed to featurize sample {sample_id}: {source}")]
    Featurization {
        /// Offending sample.
        sample_id: SampleId,
        /// Renderer error.
        #[source]
        source: RenderError,
    },

    /// The classifier failed to fit.
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    /// The artifact could not be persisted.
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// A blocking task panicked or was cancelled.
    #[error("training task failed: {0}")]
    TaskJoin(String),
}

/// Stage of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStage {
    /// Checking sample and label counts.
    Validating,
    /// Rasterizing samples.
    Featurizing,
    /// Running the classifier fit.
    Fitting,
    /// Writing the artifact.
    Persisting,
}

impl TrainingStage {
    /// Progress at which this stage starts.
    #[must_use]
    pub const fn start(self) -> f32 {
        match self {
            Self::Validating => 0.0,
            Self::Featurizing => 0.05,
            Self::Fitting => 0.7,
            Self::Persisting => 0.9,
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Trained model.
    pub model_id: ModelId,
    /// Samples used.
    pub sample_count: usize,
    /// Distinct labels learned.
    pub label_count: usize,
    /// Artifact size in bytes.
    pub artifact_bytes: usize,
    /// Completion time (ms since epoch).
    pub finished_at: u64,
}

/// Observable training state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingStatus {
    /// True while a run is in progress.
    pub is_training: bool,
    /// Model being trained.
    pub model_id: Option<ModelId>,
    /// Current stage, if training.
    pub stage: Option<TrainingStage>,
    /// Fraction complete. Never decreases within a run.
    pub progress: f32,
    /// Message of the most recent failure, cleared when a new run starts.
    pub last_error: Option<String>,
    /// Report of the most recent success.
    pub last_success: Option<TrainingReport>,
}

/// Training service configuration.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Directory holding one artifact per model.
    pub artifact_dir: PathBuf,
    /// Rasterization settings. Width and height are replaced by the
    /// classifier's input size.
    pub raster: RasterConfig,
}

impl TrainingConfig {
    /// Default rasterization with artifacts in `artifact_dir`.
    #[must_use]
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
            raster: RasterConfig::default(),
        }
    }
}

/// Trains classifiers and runs inference against their artifacts.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TrainingService {
    inner: Arc<Inner>,
}

struct Inner {
    classifier: Arc<dyn Classifier>,
    rasterizer: Rasterizer,
    artifacts: ArtifactStore,
    status: watch::Sender<TrainingStatus>,
    training: AtomicBool,
    featurizations: AtomicU64,
}

impl std::fmt::Debug for TrainingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingService")
            .field("artifact_dir", &self.inner.artifacts.dir())
            .field("input_size", &self.inner.rasterizer.output_size())
            .field("is_training", &self.is_training())
            .finish_non_exhaustive()
    }
}

/// Returns the service to idle when a run ends, however it ends.
///
/// A run whose future is dropped before finishing never reaches the success
/// or failure status update, so the guard publishes an idle status itself.
struct RunGuard<'a>(&'a Inner);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let interrupted = self.0.status.send_if_modified(|s| {
            if !s.is_training {
                return false;
            }
            s.is_training = false;
            s.stage = None;
            s.progress = 0.0;
            s.last_error = Some(RUN_INTERRUPTED.to_string());
            true
        });
        if interrupted {
            tracing::warn!(model_id = ?self.0.status.borrow().model_id, "Training interrupted");
        }
        self.0.training.store(false, Ordering::Release);
    }
}

impl TrainingService {
    /// Create a service around a classifier.
    #[must_use]
    pub fn new(config: TrainingConfig, classifier: Arc<dyn Classifier>) -> Self {
        let (width, height) = classifier.input_size();
        let raster = RasterConfig {
            width,
            height,
            ..config.raster
        };
        let (status, _) = watch::channel(TrainingStatus::default());
        Self {
            inner: Arc::new(Inner {
                classifier,
                rasterizer: Rasterizer::new(raster),
                artifacts: ArtifactStore::new(config.artifact_dir),
                status,
                training: AtomicBool::new(false),
                featurizations: AtomicU64::new(0),
            }),
        }
    }

    /// Artifact storage used by this service.
    #[must_use]
    pub fn artifacts(&self) -> &ArtifactStore {
        &self.inner.artifacts
    }

    /// Subscribe to status updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TrainingStatus> {
        self.inner.status.subscribe()
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> TrainingStatus {
        self.inner.status.borrow().clone()
    }

    /// True while a training run is in progress.
    #[must_use]
    pub fn is_training(&self) -> bool {
        self.inner.training.load(Ordering::Acquire)
    }

    /// Number of drawings featurized so far, by training or inference.
    #[must_use]
    pub fn featurization_count(&self) -> u64 {
        self.inner.featurizations.load(Ordering::Relaxed)
    }

    /// Whether a trained artifact exists for the model.
    #[must_use]
    pub fn has_artifact(&self, model_id: ModelId) -> bool {
        self.inner.artifacts.exists(model_id)
    }

    /// Delete a model's artifact. Returns false if there was none.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact exists but cannot be removed.
    pub fn delete_artifact(&self, model_id: ModelId) -> Result<bool, ArtifactError> {
        let deleted = self.inner.artifacts.delete(model_id)?;
        if deleted {
            tracing::info!(model_id = %model_id, "Artifact deleted");
        }
        Ok(deleted)
    }

    /// Read a model's raw artifact bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact exists but cannot be read.
    pub fn read_artifact(&self, model_id: ModelId) -> Result<Option<Vec<u8>>, ArtifactError> {
        self.inner.artifacts.read(model_id)
    }

    /// Install artifact bytes for a model, replacing any existing artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn write_artifact(&self, model_id: ModelId, bytes: &[u8]) -> Result<(), ArtifactError> {
        self.inner.artifacts.write(model_id, bytes)
    }

    /// Train a model from labeled samples.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::InsufficientSamples`] or
    /// [`TrainingError::InsufficientLabels`] before doing any work,
    /// [`TrainingError::AlreadyTraining`] if another run is active, or the
    /// error of whichever stage failed. The previous artifact is kept on
    /// failure.
    pub async fn train(
        &self,
        samples: &[TrainingSample],
        model_id: ModelId,
    ) -> Result<TrainingReport, TrainingError> {
        if self
            .inner
            .training
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TrainingError::AlreadyTraining);
        }
        let _guard = RunGuard(&self.inner);

        self.inner.status.send_modify(|s| {
            s.is_training = true;
            s.model_id = Some(model_id);
            s.stage = None;
            s.progress = 0.0;
            s.last_error = None;
        });
        tracing::info!(model_id = %model_id, samples = samples.len(), "Training started");

        match self.run(samples.to_vec(), model_id).await {
            Ok(report) => {
                tracing::info!(
                    model_id = %model_id,
                    samples = report.sample_count,
                    labels = report.label_count,
                    bytes = report.artifact_bytes,
                    "Training finished"
                );
                let success = report.clone();
                self.inner.status.send_modify(|s| {
                    s.is_training = false;
                    s.stage = None;
                    s.progress = 1.0;
                    s.last_success = Some(success);
                });
                Ok(report)
            }
            Err(err) => {
                tracing::warn!(model_id = %model_id, error = %err, "Training failed");
                let message = err.to_string();
                self.inner.status.send_modify(|s| {
                    s.is_training = false;
                    s.stage = None;
                    s.progress = 0.0;
                    s.last_error = Some(message);
                });
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        samples: Vec<TrainingSample>,
        model_id: ModelId,
    ) -> Result<TrainingReport, TrainingError> {
        self.enter_stage(TrainingStage::Validating);
        let label_count = validate_samples(&samples)?;
        let sample_count = samples.len();

        self.enter_stage(TrainingStage::Featurizing);
        let inner = Arc::clone(&self.inner);
        let dataset = tokio::task::spawn_blocking(move || inner.featurize_all(&samples))
            .await
            .map_err(|e| TrainingError::TaskJoin(e.to_string()))??;

        self.enter_stage(TrainingStage::Fitting);
        let inner = Arc::clone(&self.inner);
        let artifact = tokio::task::spawn_blocking(move || inner.classifier.fit(&dataset))
            .await
            .map_err(|e| TrainingError::TaskJoin(e.to_string()))??;

        self.enter_stage(TrainingStage::Persisting);
        let artifact_bytes = artifact.len();
        let artifacts = self.inner.artifacts.clone();
        tokio::task::spawn_blocking(move || artifacts.write(model_id, &artifact))
            .await
            .map_err(|e| TrainingError::TaskJoin(e.to_string()))??;

        Ok(TrainingReport {
            model_id,
            sample_count,
            label_count,
            artifact_bytes,
            finished_at: now_ms(),
        })
    }

    fn enter_stage(&self, stage: TrainingStage) {
        tracing::debug!(?stage, "Training stage");
        self.inner.status.send_modify(|s| {
            s.stage = Some(stage);
            s.progress = s.progress.max(stage.start());
        });
    }

    /// Predict the emoji for a drawing.
    ///
    /// Returns `None` without featurizing when the model has no artifact.
    /// Read, featurization, and classifier failures are logged and reported
    /// as a miss.
    pub async fn infer(&self, drawing: &Drawing, model_id: ModelId) -> Option<Prediction> {
        if !self.has_artifact(model_id) {
            tracing::debug!(model_id = %model_id, "No artifact, skipping inference");
            return None;
        }

        let inner = Arc::clone(&self.inner);
        let drawing = drawing.clone();
        let result = tokio::task::spawn_blocking(move || inner.predict(&drawing, model_id)).await;

        match result {
            Ok(Ok(prediction)) => {
                if let Some(p) = &prediction {
                    tracing::debug!(
                        model_id = %model_id,
                        emoji = %p.emoji,
                        confidence = p.confidence,
                        "Inference result"
                    );
                }
                prediction
            }
            Ok(Err(e)) => {
                tracing::warn!(model_id = %model_id, error = %e, "Inference failed");
                None
            }
            Err(e) => {
                tracing::warn!(model_id = %model_id, error = %e, "Inference task failed");
                None
            }
        }
    }
}

/// Why a single inference produced nothing.
#[derive(Debug, Error)]
enum InferenceError {
    #[error("artifact disappeared")]
    MissingArtifact,
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

impl Inner {
    fn featurize(&self, drawing: &Drawing) -> Result<FeatureTensor, RenderError> {
        self.featurizations.fetch_add(1, Ordering::Relaxed);
        self.rasterizer.featurize(drawing)
    }

    #[allow(clippy::cast_precision_loss)]
    fn featurize_all(&self, samples: &[TrainingSample]) -> Result<LabeledDataset, TrainingError> {
        let span = TrainingStage::Fitting.start() - TrainingStage::Featurizing.start();
        let total = samples.len().max(1) as f32;
        let mut dataset = LabeledDataset::new();
        for (i, sample) in samples.iter().enumerate() {
            let features =
                self.featurize(&sample.drawing)
                    .map_err(|source| TrainingError::Featurization {
                        sample_id: sample.id,
                        source,
                    })?;
            dataset.push(sample.emoji.clone(), features);

            let progress = TrainingStage::Featurizing.start() + span * (i + 1) as f32 / total;
            self.status.send_modify(|s| s.progress = s.progress.max(progress));
        }
        Ok(dataset)
    }

    fn predict(
        &self,
        drawing: &Drawing,
        model_id: ModelId,
    ) -> Result<Option<Prediction>, InferenceError> {
        let artifact = self
            .artifacts
            .read(model_id)?
            .ok_or(InferenceError::MissingArtifact)?;
        let features = self.featurize(drawing)?;
        Ok(self.classifier.predict(&artifact, &features)?)
    }
}

/// Check sample and label minimums. Returns the distinct label count.
fn validate_samples(samples: &[TrainingSample]) -> Result<usize, TrainingError> {
    if samples.len() < MIN_TRAINING_SAMPLES {
        return Err(TrainingError::InsufficientSamples {
            found: samples.len(),
        });
    }
    let labels: BTreeSet<&str> = samples.iter().map(|s| s.emoji.as_str()).collect();
    if labels.len() < MIN_TRAINING_LABELS {
        return Err(TrainingError::InsufficientLabels {
            found: labels.len(),
        });
    }
    Ok(labels.len())
}
