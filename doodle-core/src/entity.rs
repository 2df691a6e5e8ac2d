//! Persistent entities - samples, labels, models, history, playground items.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::drawing::{Bounds, CanvasSize, Drawing};
use crate::error::ValidationError;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new unique ID.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a training sample.
    SampleId
);
entity_id!(
    /// Unique identifier for a label.
    LabelId
);
entity_id!(
    /// Unique identifier for a model.
    ModelId
);
entity_id!(
    /// Unique identifier for a placed playground emoji.
    PlaygroundItemId
);

/// Current Unix timestamp in milliseconds.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Timestamps won't exceed u64 for billions of years
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A user-drawn shape paired with one emoji label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    /// Unique identifier.
    pub id: SampleId,
    /// Model this sample trains.
    pub model_id: ModelId,
    /// Emoji label.
    pub emoji: String,
    /// Captured strokes.
    pub drawing: Drawing,
    /// Canvas size at capture time.
    pub canvas_size: CanvasSize,
    /// Creation time (ms since epoch).
    pub created_at: u64,
}

impl TrainingSample {
    /// Capture a new sample, validating its contents.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the emoji is empty, the drawing has no
    /// strokes, or either canvas dimension is not positive.
    pub fn new(
        model_id: ModelId,
        emoji: impl Into<String>,
        drawing: Drawing,
        canvas_size: CanvasSize,
    ) -> Result<Self, ValidationError> {
        let sample = Self {
            id: SampleId::new(),
            model_id,
            emoji: emoji.into(),
            drawing,
            canvas_size,
            created_at: now_ms(),
        };
        sample.validate()?;
        Ok(sample)
    }

    /// Check the sample invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.emoji.trim().is_empty() {
            return Err(ValidationError::EmptyEmoji);
        }
        if self.drawing.is_empty() {
            return Err(ValidationError::EmptyStrokes);
        }
        if !self.canvas_size.is_valid() {
            return Err(ValidationError::InvalidCanvasSize {
                width: self.canvas_size.width,
                height: self.canvas_size.height,
            });
        }
        Ok(())
    }
}

/// Aggregate record of one emoji's usage within one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInfo {
    /// Unique identifier.
    pub id: LabelId,
    /// Emoji this label aggregates.
    pub emoji: String,
    /// Optional human-readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Cached number of live samples with this emoji and model.
    pub sample_count: usize,
    /// Owning model.
    pub model_id: ModelId,
}

impl LabelInfo {
    /// Create a label with the given count.
    #[must_use]
    pub fn new(model_id: ModelId, emoji: impl Into<String>, sample_count: usize) -> Self {
        Self {
            id: LabelId::new(),
            emoji: emoji.into(),
            display_name: None,
            sample_count,
            model_id,
        }
    }

    /// Display name if set, otherwise the emoji itself.
    #[must_use]
    pub fn title(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.emoji)
    }
}

/// An independently trainable emoji-recognition unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Unique identifier.
    pub id: ModelId,
    /// User-facing name.
    pub name: String,
    /// Creation time (ms since epoch).
    pub created_at: u64,
    /// Last successful training (ms since epoch).
    #[serde(default)]
    pub last_trained_at: Option<u64>,
    /// Whether this is the model used for recognition.
    #[serde(default)]
    pub is_active: bool,
}

impl ModelInfo {
    /// Name given to the model created when none exist.
    pub const DEFAULT_NAME: &'static str = "My Model";

    /// Create an inactive, untrained model.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ModelId::new(),
            name: name.into(),
            created_at: now_ms(),
            last_trained_at: None,
            is_active: false,
        }
    }

    /// Request activation when added to the store.
    #[must_use]
    pub fn active(mut self) -> Self {
        self.is_active = true;
        self
    }

    /// Check the model invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyModelName`] for a blank name.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyModelName);
        }
        Ok(())
    }
}

/// One recorded recognition outcome, kept for statistics only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Predicted emoji.
    pub emoji: String,
    /// Classifier confidence (0.0 to 1.0).
    pub confidence: f32,
    /// When the prediction was made (ms since epoch).
    pub timestamp: u64,
    /// Model that produced the prediction.
    pub model_id: ModelId,
}

impl ClassificationResult {
    /// Record a prediction made now.
    #[must_use]
    pub fn new(model_id: ModelId, emoji: impl Into<String>, confidence: f32) -> Self {
        Self {
            emoji: emoji.into(),
            confidence,
            timestamp: now_ms(),
            model_id,
        }
    }
}

/// An emoji placed on the testing canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaygroundItem {
    /// Unique identifier.
    pub id: PlaygroundItemId,
    /// Placed emoji.
    pub emoji: String,
    /// Center of the placement in canvas coordinates.
    pub position: (f32, f32),
    /// Side length of the square placement.
    pub size: f32,
    /// Placement time (ms since epoch).
    pub timestamp: u64,
}

impl PlaygroundItem {
    /// Place an emoji centered in the given box.
    #[must_use]
    pub fn in_bounds(emoji: impl Into<String>, bounds: &Bounds) -> Self {
        Self {
            id: PlaygroundItemId::new(),
            emoji: emoji.into(),
            position: bounds.center(),
            size: bounds.max_side(),
            timestamp: now_ms(),
        }
    }
}

/// Persisted user preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Play haptic feedback on accept/reject.
    pub haptics_enabled: bool,
    /// Show the classifier confidence next to placed emoji.
    pub show_confidence: bool,
    /// Canvas background color (RGBA).
    pub canvas_background: [u8; 4],
    /// Whether the onboarding flow has been completed.
    pub onboarding_complete: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            haptics_enabled: true,
            show_confidence: false,
            canvas_background: [255, 255, 255, 255],
            onboarding_complete: false,
        }
    }
}
