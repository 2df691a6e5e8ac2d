//! Persistent sample storage.
//!
//! Provides a thread-safe [`SampleStore`] that owns every training sample,
//! label, and model, plus the small collections around them (settings,
//! classification history, playground items). The store enforces validation
//! and cascading deletes, keeps label counts in step with live samples, and
//! writes each touched collection to disk synchronously on every mutation.
//!
//! Persistence is best effort: a failed write is recorded in
//! [`SampleStore::last_save_error`] and never rolls back the in-memory state,
//! which stays the source of truth for the running session.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;

use crate::backup::BackupBundle;
use crate::entity::{
    AppSettings, ClassificationResult, LabelId, LabelInfo, ModelId, ModelInfo, PlaygroundItem,
    SampleId, TrainingSample,
};
use crate::error::{StoreError, StoreResult, ValidationError};
use crate::history::{ClassificationHistory, EmojiStats};

/// A change notification delivered to store subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// A sample was added.
    SampleAdded(SampleId),
    /// A sample was removed.
    SampleRemoved(SampleId),
    /// Labels of a model were recomputed, renamed, or removed.
    LabelsChanged(ModelId),
    /// Models were added, updated, removed, or re-activated.
    ModelsChanged,
    /// Settings were updated.
    SettingsChanged,
    /// Classification history changed.
    HistoryChanged,
    /// Playground items changed.
    PlaygroundChanged,
    /// Every collection was replaced from a backup.
    Restored,
}

/// Handle returned by [`SampleStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ChangeCallback = Arc<dyn Fn(&StoreChange) + Send + Sync>;

/// Persisted collections, one JSON file each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    Samples,
    Models,
    Labels,
    Settings,
    History,
    Playground,
}

impl Collection {
    const ALL: [Self; 6] = [
        Self::Samples,
        Self::Models,
        Self::Labels,
        Self::Settings,
        Self::History,
        Self::Playground,
    ];

    const fn file_name(self) -> &'static str {
        match self {
            Self::Samples => "samples.json",
            Self::Models => "models.json",
            Self::Labels => "labels.json",
            Self::Settings => "settings.json",
            Self::History => "history.json",
            Self::Playground => "playground.json",
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    samples: Vec<TrainingSample>,
    models: Vec<ModelInfo>,
    labels: Vec<LabelInfo>,
    settings: AppSettings,
    history: ClassificationHistory,
    playground: Vec<PlaygroundItem>,
}

impl StoreState {
    /// Set the (emoji, model) label count to the live sample count.
    ///
    /// Creates the label on first use and drops it when the count hits zero.
    fn recount_label(&mut self, emoji: &str, model_id: ModelId) {
        let count = self
            .samples
            .iter()
            .filter(|s| s.model_id == model_id && s.emoji == emoji)
            .count();
        let existing = self
            .labels
            .iter()
            .position(|l| l.model_id == model_id && l.emoji == emoji);
        match (existing, count) {
            (Some(idx), 0) => {
                self.labels.remove(idx);
            }
            (Some(idx), n) => self.labels[idx].sample_count = n,
            (None, 0) => {}
            (None, n) => self.labels.push(LabelInfo::new(model_id, emoji, n)),
        }
    }

    /// Recompute every label of a model from scratch.
    ///
    /// Runs on every single-sample delete so drift introduced anywhere else
    /// is corrected. Surviving labels keep their id and display name.
    fn rebuild_labels_for_model(&mut self, model_id: ModelId) {
        let counts = count_samples(&self.samples)
            .into_iter()
            .filter(|((owner, _), _)| *owner == model_id)
            .map(|((_, emoji), count)| (emoji, count));

        let mut previous: Vec<LabelInfo> = Vec::new();
        self.labels.retain(|l| {
            if l.model_id == model_id {
                previous.push(l.clone());
                false
            } else {
                true
            }
        });

        for (emoji, count) in counts {
            let label = match previous.iter().position(|l| l.emoji == emoji) {
                Some(idx) => {
                    let mut label = previous.swap_remove(idx);
                    label.sample_count = count;
                    label
                }
                None => LabelInfo::new(model_id, emoji, count),
            };
            self.labels.push(label);
        }
    }

    /// Re-establish the single-active-model invariant.
    ///
    /// Keeps the first active model, or activates index 0 if none is active.
    /// Returns true if any flag changed.
    fn normalize_active(&mut self) -> bool {
        let mut changed = false;
        let mut seen_active = false;
        for model in &mut self.models {
            if model.is_active {
                if seen_active {
                    model.is_active = false;
                    changed = true;
                }
                seen_active = true;
            }
        }
        if !seen_active {
            if let Some(first) = self.models.first_mut() {
                first.is_active = true;
                changed = true;
            }
        }
        changed
    }

    /// Create the default model when there are none. Returns true if created.
    fn ensure_default_model(&mut self) -> bool {
        if !self.models.is_empty() {
            return false;
        }
        self.models.push(ModelInfo::new(ModelInfo::DEFAULT_NAME).active());
        true
    }
}

/// Thread-safe owner of samples, labels, and models.
///
/// Clones share the same underlying state.
///
/// # Example
///
/// ```
/// use doodle_core::{CanvasSize, Drawing, SampleStore, Stroke, TrainingSample};
///
/// let store = SampleStore::new();
/// let model = store.add_model(doodle_core::ModelInfo::new("Shapes")).unwrap();
///
/// let drawing = Drawing::from_strokes(vec![Stroke::from_xy(&[(0.0, 0.0), (10.0, 10.0)])]);
/// let sample = TrainingSample::new(model, "⭐", drawing, CanvasSize::new(300.0, 300.0)).unwrap();
/// store.add_sample(sample).unwrap();
///
/// assert_eq!(store.labels_for(model)[0].sample_count, 1);
/// ```
#[derive(Clone)]
pub struct SampleStore {
    state: Arc<RwLock<StoreState>>,
    /// Optional data directory for filesystem persistence.
    data_dir: Option<PathBuf>,
    observers: Arc<RwLock<Vec<(SubscriptionId, ChangeCallback)>>>,
    next_subscription: Arc<AtomicU64>,
    version: Arc<AtomicU64>,
    last_save_error: Arc<RwLock<Option<String>>>,
    last_load_error: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for SampleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleStore")
            .field("data_dir", &self.data_dir)
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleStore {
    /// Create an empty in-memory store (no persistence, no models).
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            data_dir: None,
            observers: Arc::new(RwLock::new(Vec::new())),
            next_subscription: Arc::new(AtomicU64::new(1)),
            version: Arc::new(AtomicU64::new(0)),
            last_save_error: Arc::new(RwLock::new(None)),
            last_load_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Open a store persisted in `data_dir`, loading any saved collections.
    ///
    /// The directory is created if it doesn't exist. A collection that fails
    /// to load stays empty and the failure is reported through
    /// [`Self::last_load_error`]. After loading, a default model is created if
    /// there are none, exactly one model is active, and label counts are
    /// recomputed from the loaded samples.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub fn open(data_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        let store = Self {
            data_dir: Some(data_dir),
            ..Self::new()
        };
        store.load();
        Ok(store)
    }

    /// Directory used for persistence, if any.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    // -----------------------------------------------------------------------
    // Samples
    // -----------------------------------------------------------------------

    /// Add a validated sample and update its label count.
    ///
    /// When this returns, the (emoji, model) label count equals the number of
    /// live samples with that pair.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the emoji is empty, the drawing has no
    /// strokes, or the canvas size is not positive. Nothing is stored.
    pub fn add_sample(&self, sample: TrainingSample) -> Result<SampleId, ValidationError> {
        sample.validate()?;
        let id = sample.id;
        let model_id = sample.model_id;
        {
            let mut state = self.write_state();
            let emoji = sample.emoji.clone();
            state.samples.push(sample);
            state.recount_label(&emoji, model_id);
        }
        tracing::debug!(sample_id = %id, model_id = %model_id, "Sample added");
        self.persist(&[Collection::Samples, Collection::Labels]);
        self.notify(&StoreChange::SampleAdded(id));
        self.notify(&StoreChange::LabelsChanged(model_id));
        Ok(id)
    }

    /// Remove a sample by id.
    ///
    /// Recomputes every label of the sample's model, not just the affected
    /// emoji. Returns the removed sample, or `None` if the id is unknown.
    pub fn remove_sample(&self, sample_id: SampleId) -> Option<TrainingSample> {
        let removed = {
            let mut state = self.write_state();
            let idx = state.samples.iter().position(|s| s.id == sample_id)?;
            let removed = state.samples.remove(idx);
            state.rebuild_labels_for_model(removed.model_id);
            removed
        };
        tracing::debug!(sample_id = %sample_id, model_id = %removed.model_id, "Sample removed");
        self.persist(&[Collection::Samples, Collection::Labels]);
        self.notify(&StoreChange::SampleRemoved(sample_id));
        self.notify(&StoreChange::LabelsChanged(removed.model_id));
        Some(removed)
    }

    /// All samples.
    #[must_use]
    pub fn samples(&self) -> Vec<TrainingSample> {
        self.read_state().samples.clone()
    }

    /// Samples owned by a model.
    #[must_use]
    pub fn samples_for_model(&self, model_id: ModelId) -> Vec<TrainingSample> {
        self.read_state()
            .samples
            .iter()
            .filter(|s| s.model_id == model_id)
            .cloned()
            .collect()
    }

    /// Samples owned by a model with a given emoji.
    #[must_use]
    pub fn samples_for(&self, emoji: &str, model_id: ModelId) -> Vec<TrainingSample> {
        self.read_state()
            .samples
            .iter()
            .filter(|s| s.model_id == model_id && s.emoji == emoji)
            .cloned()
            .collect()
    }

    /// Number of samples owned by a model.
    #[must_use]
    pub fn sample_count_for_model(&self, model_id: ModelId) -> usize {
        self.read_state()
            .samples
            .iter()
            .filter(|s| s.model_id == model_id)
            .count()
    }

    // -----------------------------------------------------------------------
    // Labels
    // -----------------------------------------------------------------------

    /// All labels.
    #[must_use]
    pub fn labels(&self) -> Vec<LabelInfo> {
        self.read_state().labels.clone()
    }

    /// Labels owned by a model.
    #[must_use]
    pub fn labels_for(&self, model_id: ModelId) -> Vec<LabelInfo> {
        self.read_state()
            .labels
            .iter()
            .filter(|l| l.model_id == model_id)
            .cloned()
            .collect()
    }

    /// Delete a label and every sample with its (emoji, model) pair.
    ///
    /// Returns the number of samples removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LabelNotFound`] if the label does not exist.
    pub fn remove_label(&self, label_id: LabelId) -> StoreResult<usize> {
        let (model_id, removed) = {
            let mut state = self.write_state();
            let idx = state
                .labels
                .iter()
                .position(|l| l.id == label_id)
                .ok_or(StoreError::LabelNotFound(label_id))?;
            let label = state.labels.remove(idx);
            let before = state.samples.len();
            state
                .samples
                .retain(|s| !(s.model_id == label.model_id && s.emoji == label.emoji));
            (label.model_id, before - state.samples.len())
        };
        tracing::info!(label_id = %label_id, removed, "Label removed");
        self.persist(&[Collection::Samples, Collection::Labels]);
        self.notify(&StoreChange::LabelsChanged(model_id));
        Ok(removed)
    }

    /// Set or clear a label's display name.
    ///
    /// Blank names clear the display name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LabelNotFound`] if the label does not exist.
    pub fn rename_label(&self, label_id: LabelId, display_name: Option<String>) -> StoreResult<()> {
        let model_id = {
            let mut state = self.write_state();
            let label = state
                .labels
                .iter_mut()
                .find(|l| l.id == label_id)
                .ok_or(StoreError::LabelNotFound(label_id))?;
            label.display_name = display_name.filter(|n| !n.trim().is_empty());
            label.model_id
        };
        self.persist(&[Collection::Labels]);
        self.notify(&StoreChange::LabelsChanged(model_id));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Models
    // -----------------------------------------------------------------------

    /// All models.
    #[must_use]
    pub fn models(&self) -> Vec<ModelInfo> {
        self.read_state().models.clone()
    }

    /// Look up a model by id.
    #[must_use]
    pub fn model(&self, model_id: ModelId) -> Option<ModelInfo> {
        self.read_state()
            .models
            .iter()
            .find(|m| m.id == model_id)
            .cloned()
    }

    /// The active model, if any.
    #[must_use]
    pub fn active_model(&self) -> Option<ModelInfo> {
        self.read_state()
            .models
            .iter()
            .find(|m| m.is_active)
            .cloned()
    }

    /// Add a model.
    ///
    /// The first model added is always active. A model that requests
    /// activation deactivates every other model first.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyModelName`] for a blank name.
    pub fn add_model(&self, mut model: ModelInfo) -> Result<ModelId, ValidationError> {
        model.validate()?;
        let id = model.id;
        {
            let mut state = self.write_state();
            if state.models.is_empty() || model.is_active {
                for existing in &mut state.models {
                    existing.is_active = false;
                }
                model.is_active = true;
            }
            state.models.push(model);
        }
        tracing::info!(model_id = %id, "Model added");
        self.persist(&[Collection::Models]);
        self.notify(&StoreChange::ModelsChanged);
        Ok(id)
    }

    /// Replace a model's attributes by id.
    ///
    /// The stored active flag is kept; use [`Self::set_active_model`] to change
    /// activation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for a blank name or
    /// [`StoreError::ModelNotFound`] if the id is unknown.
    pub fn update_model(&self, model: ModelInfo) -> StoreResult<()> {
        model.validate()?;
        {
            let mut state = self.write_state();
            let slot = state
                .models
                .iter_mut()
                .find(|m| m.id == model.id)
                .ok_or(StoreError::ModelNotFound(model.id))?;
            let is_active = slot.is_active;
            *slot = ModelInfo { is_active, ..model };
        }
        self.persist(&[Collection::Models]);
        self.notify(&StoreChange::ModelsChanged);
        Ok(())
    }

    /// Remove a model with its samples and labels.
    ///
    /// If the removed model was active and others remain, the first remaining
    /// model becomes active. Trained artifacts live outside the store and must
    /// be deleted by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ModelNotFound`] if the id is unknown.
    pub fn remove_model(&self, model_id: ModelId) -> StoreResult<ModelInfo> {
        let removed = {
            let mut state = self.write_state();
            let idx = state
                .models
                .iter()
                .position(|m| m.id == model_id)
                .ok_or(StoreError::ModelNotFound(model_id))?;
            state.samples.retain(|s| s.model_id != model_id);
            state.labels.retain(|l| l.model_id != model_id);
            let removed = state.models.remove(idx);
            if removed.is_active {
                if let Some(first) = state.models.first_mut() {
                    first.is_active = true;
                }
            }
            removed
        };
        tracing::info!(model_id = %model_id, "Model removed");
        self.persist(&[Collection::Samples, Collection::Labels, Collection::Models]);
        self.notify(&StoreChange::LabelsChanged(model_id));
        self.notify(&StoreChange::ModelsChanged);
        Ok(removed)
    }

    /// Make a model the only active model.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ModelNotFound`] if the id is unknown; no flag is
    /// changed in that case.
    pub fn set_active_model(&self, model_id: ModelId) -> StoreResult<()> {
        {
            let mut state = self.write_state();
            if !state.models.iter().any(|m| m.id == model_id) {
                return Err(StoreError::ModelNotFound(model_id));
            }
            for model in &mut state.models {
                model.is_active = model.id == model_id;
            }
        }
        tracing::info!(model_id = %model_id, "Active model changed");
        self.persist(&[Collection::Models]);
        self.notify(&StoreChange::ModelsChanged);
        Ok(())
    }

    /// Record a successful training run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ModelNotFound`] if the id is unknown.
    pub fn mark_trained(&self, model_id: ModelId, timestamp: u64) -> StoreResult<()> {
        {
            let mut state = self.write_state();
            let model = state
                .models
                .iter_mut()
                .find(|m| m.id == model_id)
                .ok_or(StoreError::ModelNotFound(model_id))?;
            model.last_trained_at = Some(timestamp);
        }
        self.persist(&[Collection::Models]);
        self.notify(&StoreChange::ModelsChanged);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // History, playground, settings
    // -----------------------------------------------------------------------

    /// Append a recognition outcome to the bounded history.
    pub fn record_classification(&self, result: ClassificationResult) {
        self.write_state().history.record(result);
        self.persist(&[Collection::History]);
        self.notify(&StoreChange::HistoryChanged);
    }

    /// Classification history, oldest first.
    #[must_use]
    pub fn classification_history(&self) -> Vec<ClassificationResult> {
        self.read_state().history.to_vec()
    }

    /// Remove every recorded classification.
    pub fn clear_history(&self) {
        self.write_state().history.clear();
        self.persist(&[Collection::History]);
        self.notify(&StoreChange::HistoryChanged);
    }

    /// Per-emoji recognition statistics, optionally limited to one model.
    #[must_use]
    pub fn accuracy_summary(&self, model_id: Option<ModelId>) -> Vec<EmojiStats> {
        self.read_state().history.summary(model_id)
    }

    /// Add a placed emoji to the playground.
    pub fn add_playground_item(&self, item: PlaygroundItem) {
        self.write_state().playground.push(item);
        self.persist(&[Collection::Playground]);
        self.notify(&StoreChange::PlaygroundChanged);
    }

    /// Placed playground emoji in placement order.
    #[must_use]
    pub fn playground_items(&self) -> Vec<PlaygroundItem> {
        self.read_state().playground.clone()
    }

    /// Remove every placed emoji.
    pub fn clear_playground(&self) {
        self.write_state().playground.clear();
        self.persist(&[Collection::Playground]);
        self.notify(&StoreChange::PlaygroundChanged);
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> AppSettings {
        self.read_state().settings.clone()
    }

    /// Update settings using a closure.
    pub fn update_settings<F>(&self, f: F)
    where
        F: FnOnce(&mut AppSettings),
    {
        f(&mut self.write_state().settings);
        self.persist(&[Collection::Settings]);
        self.notify(&StoreChange::SettingsChanged);
    }

    // -----------------------------------------------------------------------
    // Backup
    // -----------------------------------------------------------------------

    /// Snapshot every collection plus the given artifact blobs.
    #[must_use]
    pub fn export_backup<I>(&self, artifacts: I) -> BackupBundle
    where
        I: IntoIterator<Item = (ModelId, Vec<u8>)>,
    {
        let mut bundle = BackupBundle::empty();
        {
            let state = self.read_state();
            bundle.samples = state.samples.clone();
            bundle.models = state.models.clone();
            bundle.labels = state.labels.clone();
            bundle.settings = state.settings.clone();
            bundle.history = state.history.to_vec();
            bundle.playground = state.playground.clone();
        }
        for (model_id, bytes) in artifacts {
            bundle.insert_artifact(model_id, &bytes);
        }
        bundle
    }

    /// Replace every collection with the contents of a bundle.
    ///
    /// The bundle is fully checked before anything is replaced. Invariants are
    /// re-established afterwards (default model, single active model, label
    /// counts). A model that fails validation is skipped along with its
    /// samples and artifact. Returns the decoded artifacts for the caller to
    /// install.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedBackupVersion`] for bundles written by a
    /// newer format, or [`StoreError::InvalidArtifactEncoding`] for a corrupt
    /// artifact blob.
    pub fn restore_backup(&self, bundle: &BackupBundle) -> StoreResult<Vec<(ModelId, Vec<u8>)>> {
        bundle.check_version()?;
        let mut artifacts = bundle.decode_artifacts()?;
        let models: Vec<ModelInfo> = bundle
            .models
            .iter()
            .filter(|m| {
                let valid = m.validate().is_ok();
                if !valid {
                    tracing::warn!(model_id = %m.id, "Skipping invalid model in backup");
                }
                valid
            })
            .cloned()
            .collect();
        let samples: Vec<TrainingSample> = bundle
            .samples
            .iter()
            .filter(|s| {
                if !models.iter().any(|m| m.id == s.model_id) {
                    tracing::warn!(sample_id = %s.id, "Skipping backup sample of unknown model");
                    return false;
                }
                let valid = s.validate().is_ok();
                if !valid {
                    tracing::warn!(sample_id = %s.id, "Skipping invalid sample in backup");
                }
                valid
            })
            .cloned()
            .collect();
        artifacts.retain(|(id, _)| models.iter().any(|m| m.id == *id));
        {
            let mut state = self.write_state();
            state.samples = samples;
            state.models = models;
            state.labels = bundle.labels.clone();
            state.settings = bundle.settings.clone();
            state.history = ClassificationHistory::from_entries(bundle.history.clone());
            state.playground = bundle.playground.clone();
            Self::heal(&mut state);
        }
        tracing::info!(
            format_version = bundle.format_version,
            artifacts = artifacts.len(),
            "Backup restored"
        );
        self.persist(&Collection::ALL);
        self.notify(&StoreChange::Restored);
        Ok(artifacts)
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    /// Register a callback invoked after every mutation.
    ///
    /// Callbacks run synchronously on the mutating thread, after the store
    /// lock has been released.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StoreChange) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(sid, _)| *sid != id);
        observers.len() != before
    }

    /// Monotonic counter bumped on every change notification.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Message from the most recent failed save, cleared by the next success.
    #[must_use]
    pub fn last_save_error(&self) -> Option<String> {
        self.last_save_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Message from the most recent failed load.
    #[must_use]
    pub fn last_load_error(&self) -> Option<String> {
        self.last_load_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, change: &StoreChange) {
        self.version.fetch_add(1, Ordering::AcqRel);
        let callbacks: Vec<ChangeCallback> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(change);
        }
    }

    /// Re-establish every cross-collection invariant after a bulk load.
    fn heal(state: &mut StoreState) -> bool {
        let created = state.ensure_default_model();
        let activated = state.normalize_active();
        let mut label_models: Vec<ModelId> = state.samples.iter().map(|s| s.model_id).collect();
        label_models.extend(state.labels.iter().map(|l| l.model_id));
        label_models.sort();
        label_models.dedup();
        let before = state.labels.clone();
        for model_id in label_models {
            state.rebuild_labels_for_model(model_id);
        }
        created || activated || before != state.labels
    }

    /// Load every collection from the data directory.
    fn load(&self) {
        let Some(ref data_dir) = self.data_dir else {
            return;
        };
        let mut errors = Vec::new();
        let healed = {
            let mut state = self.write_state();
            if let Some(samples) = load_collection(data_dir, Collection::Samples, &mut errors) {
                state.samples = samples;
            }
            if let Some(models) = load_collection(data_dir, Collection::Models, &mut errors) {
                state.models = models;
            }
            if let Some(labels) = load_collection(data_dir, Collection::Labels, &mut errors) {
                state.labels = labels;
            }
            if let Some(settings) = load_collection(data_dir, Collection::Settings, &mut errors) {
                state.settings = settings;
            }
            let history: Option<Vec<ClassificationResult>> =
                load_collection(data_dir, Collection::History, &mut errors);
            if let Some(history) = history {
                state.history = ClassificationHistory::from_entries(history);
            }
            if let Some(items) = load_collection(data_dir, Collection::Playground, &mut errors) {
                state.playground = items;
            }
            Self::heal(&mut state)
        };

        *self
            .last_load_error
            .write()
            .unwrap_or_else(PoisonError::into_inner) = errors.pop();

        tracing::info!(
            data_dir = %data_dir.display(),
            samples = self.read_state().samples.len(),
            models = self.read_state().models.len(),
            "Sample store loaded"
        );
        if healed {
            self.persist(&[Collection::Models, Collection::Labels]);
        }
    }

    /// Save the given collections to disk.
    ///
    /// No-op if the store was created without a data directory.
    fn persist(&self, collections: &[Collection]) {
        let Some(ref data_dir) = self.data_dir else {
            return;
        };
        let mut failure = None;
        for &collection in collections {
            let json = {
                let state = self.read_state();
                match collection {
                    Collection::Samples => serde_json::to_string_pretty(&state.samples),
                    Collection::Models => serde_json::to_string_pretty(&state.models),
                    Collection::Labels => serde_json::to_string_pretty(&state.labels),
                    Collection::Settings => serde_json::to_string_pretty(&state.settings),
                    Collection::History => serde_json::to_string_pretty(&state.history.to_vec()),
                    Collection::Playground => serde_json::to_string_pretty(&state.playground),
                }
            };
            let path = data_dir.join(collection.file_name());
            let result = json
                .map_err(StoreError::from)
                .and_then(|j| std::fs::write(&path, j).map_err(StoreError::from));
            if let Err(e) = result {
                tracing::warn!("Failed to persist {}: {e}", path.display());
                failure = Some(format!("Failed to save {}: {e}", collection.file_name()));
            }
        }
        *self
            .last_save_error
            .write()
            .unwrap_or_else(PoisonError::into_inner) = failure;
    }
}

/// Read one collection file. Missing files are not errors.
fn load_collection<T: DeserializeOwned>(
    data_dir: &Path,
    collection: Collection,
    errors: &mut Vec<String>,
) -> Option<T> {
    let path = data_dir.join(collection.file_name());
    if !path.exists() {
        return None;
    }
    let parsed = std::fs::read_to_string(&path)
        .map_err(StoreError::from)
        .and_then(|contents| serde_json::from_str(&contents).map_err(StoreError::from));
    match parsed {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Failed to load {}: {e}", path.display());
            errors.push(format!("Failed to load {}: {e}", collection.file_name()));
            None
        }
    }
}

/// Count live samples per (model, emoji) pair.
#[must_use]
pub fn count_samples(samples: &[TrainingSample]) -> BTreeMap<(ModelId, String), usize> {
    let mut counts = BTreeMap::new();
    for sample in samples {
        *counts
            .entry((sample.model_id, sample.emoji.clone()))
            .or_insert(0) += 1;
    }
    counts
}
