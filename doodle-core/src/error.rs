//! Error types for sample store operations.

use thiserror::Error;

use crate::entity::{LabelId, ModelId};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Input rejected before it reaches the store.
///
/// Validation failures never mutate state; callers surface them as short
/// user-facing messages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A sample or label was given an empty emoji.
    #[error("Emoji label must not be empty")]
    EmptyEmoji,

    /// A sample was captured without any strokes.
    #[error("Drawing must contain at least one stroke")]
    EmptyStrokes,

    /// The capture canvas had a zero or negative dimension.
    #[error("Invalid canvas size: {width}x{height}")]
    InvalidCanvasSize {
        /// Captured width.
        width: f32,
        /// Captured height.
        height: f32,
    },

    /// A model was given an empty name.
    #[error("Model name must not be empty")]
    EmptyModelName,
}

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The requested model does not exist.
    #[error("Model not found: {0}")]
    ModelNotFound(ModelId),

    /// The requested label does not exist.
    #[error("Label not found: {0}")]
    LabelNotFound(LabelId),

    /// The store was created without a data directory.
    #[error("No data directory configured")]
    NoDataDirectory,

    /// A backup was written by a newer version of the format.
    #[error("Backup format version {found} is newer than supported version {supported}")]
    UnsupportedBackupVersion {
        /// Version found in the bundle.
        found: u32,
        /// Highest version this build can read.
        supported: u32,
    },

    /// A backup carried an artifact blob that is not valid base64.
    #[error("Invalid artifact encoding for model {model_id}: {reason}")]
    InvalidArtifactEncoding {
        /// Model the artifact belongs to.
        model_id: String,
        /// Decoder message.
        reason: String,
    },

    /// An I/O error occurred during persistence.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
