//! # Doodle Moji Core
//!
//! Data model and persistent storage for a personal drawing classifier.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                doodle-core                  │
//! ├─────────────────────────────────────────────┤
//! │  Drawing         │  Sample Store            │
//! │  - Strokes       │  - Samples / labels      │
//! │  - Ink, points   │  - Models (one active)   │
//! │  - Bounds        │  - History, playground   │
//! ├─────────────────────────────────────────────┤
//! │  Backup bundles  │  Change subscriptions    │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backup;
pub mod drawing;
pub mod entity;
pub mod error;
pub mod history;
pub mod store;

pub use backup::{BackupBundle, BACKUP_FORMAT_VERSION};
pub use drawing::{
    AffineTransform, Bounds, CanvasSize, Drawing, InkKind, InkStyle, Stroke, StrokePoint,
};
pub use entity::{
    now_ms, AppSettings, ClassificationResult, LabelId, LabelInfo, ModelId, ModelInfo,
    PlaygroundItem, PlaygroundItemId, SampleId, TrainingSample,
};
pub use error::{StoreError, StoreResult, ValidationError};
pub use history::{ClassificationHistory, EmojiStats, DEFAULT_HISTORY_CAPACITY};
pub use store::{SampleStore, StoreChange, SubscriptionId};

/// Doodle core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
