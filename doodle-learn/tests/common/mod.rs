//! Shared fixtures for doodle-learn integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use doodle_core::{CanvasSize, Drawing, ModelId, Stroke, TrainingSample};
use doodle_learn::{Classifier, ClassifierError, LabeledDataset, Prediction};
use doodle_renderer::FeatureTensor;

/// Deterministic classifier: always predicts the same emoji and confidence.
///
/// Tracks how many predictions run at once so tests can check that a session
/// never overlaps inferences.
#[derive(Debug)]
pub struct StubClassifier {
    pub emoji: String,
    pub confidence: f32,
    pub delay: Duration,
    pub fit_delay: Duration,
    pub fits: AtomicUsize,
    pub predictions: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl StubClassifier {
    pub fn new(emoji: &str, confidence: f32) -> Self {
        Self {
            emoji: emoji.to_string(),
            confidence,
            delay: Duration::ZERO,
            fit_delay: Duration::ZERO,
            fits: AtomicUsize::new(0),
            predictions: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_fit_delay(mut self, delay: Duration) -> Self {
        self.fit_delay = delay;
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Classifier for StubClassifier {
    fn input_size(&self) -> (u32, u32) {
        (8, 8)
    }

    fn fit(&self, dataset: &LabeledDataset) -> Result<Vec<u8>, ClassifierError> {
        self.fits.fetch_add(1, Ordering::SeqCst);
        if !self.fit_delay.is_zero() {
            std::thread::sleep(self.fit_delay);
        }
        Ok(format!("stub:{}", dataset.len()).into_bytes())
    }

    fn predict(
        &self,
        _artifact: &[u8],
        input: &FeatureTensor,
    ) -> Result<Option<Prediction>, ClassifierError> {
        assert_eq!((input.width, input.height), (8, 8));
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.predictions.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(Some(Prediction::new(self.emoji.clone(), self.confidence)))
    }
}

pub fn stroke(offset: f32) -> Stroke {
    Stroke::from_xy(&[
        (offset, offset),
        (offset + 40.0, offset),
        (offset + 40.0, offset + 40.0),
    ])
}

pub fn sample(model_id: ModelId, emoji: &str, offset: f32) -> TrainingSample {
    TrainingSample::new(
        model_id,
        emoji,
        Drawing::from_strokes(vec![stroke(offset)]),
        CanvasSize::new(390.0, 390.0),
    )
    .expect("valid sample")
}
