//! # Doodle Moji Learn
//!
//! Training pipeline and live recognition for personal doodle classifiers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                DoodleEngine                 │
//! ├──────────────────────┬──────────────────────┤
//! │   TrainingService    │  RecognitionSession  │
//! │   - validate         │  - tick / debounce   │
//! │   - featurize        │  - rate limit        │
//! │   - fit (Classifier) │  - accept / reject   │
//! │   - persist artifact │  - stale results     │
//! ├──────────────────────┴──────────────────────┤
//! │  SampleStore (doodle-core) │ ArtifactStore  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The classifier is an injected [`Classifier`]; [`CentroidClassifier`] is
//! the built-in default.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod artifact;
pub mod classifier;
pub mod dataset;
pub mod engine;
pub mod recognition;
pub mod session;
pub mod training;

pub use artifact::{ArtifactError, ArtifactStore};
pub use classifier::{CentroidClassifier, CentroidModel, Classifier, ClassifierError, Prediction};
pub use dataset::LabeledDataset;
pub use engine::{DoodleEngine, EngineError, EngineResult, ARTIFACT_DIR_NAME};
pub use recognition::{
    placement_bounds, AttemptOutcome, AttemptTicket, Decision, HoldReason, LoopPhase, Placement,
    RecognitionConfig, RecognitionLoop, RejectReason,
};
pub use session::{
    DrawingSource, RecognitionEvent, RecognitionHandle, RecognitionSession, SharedCanvas,
};
pub use training::{
    TrainingConfig, TrainingError, TrainingReport, TrainingService, TrainingStage, TrainingStatus,
    MIN_TRAINING_LABELS, MIN_TRAINING_SAMPLES, RUN_INTERRUPTED,
};
