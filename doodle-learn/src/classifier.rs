//! Classifier capability and the built-in centroid classifier.
//!
//! The training pipeline treats the learning algorithm as an injected
//! [`Classifier`]: it hands over correctly labeled feature tensors and gets back
//! an opaque artifact, then hands the artifact back at inference time. Anything
//! that can fit and predict from bytes can be plugged in, including
//! deterministic stubs in tests.

use std::collections::BTreeMap;

use doodle_renderer::{FeatureTensor, DEFAULT_INPUT_SIZE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::LabeledDataset;

/// Errors reported by a classifier.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The dataset cannot be fitted.
    #[error("Invalid training data: {0}")]
    InvalidDataset(String),

    /// The artifact bytes could not be decoded or are inconsistent.
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// The input tensor does not match the classifier's input contract.
    #[error("Input is {found:?}, expected {expected:?}")]
    InputMismatch {
        /// Size the classifier expects.
        expected: (u32, u32),
        /// Size that was supplied.
        found: (u32, u32),
    },

    /// Serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A predicted label and its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted emoji.
    pub emoji: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

impl Prediction {
    /// Create a prediction.
    #[must_use]
    pub fn new(emoji: impl Into<String>, confidence: f32) -> Self {
        Self {
            emoji: emoji.into(),
            confidence,
        }
    }
}

/// An updatable classifier that trains to, and predicts from, opaque bytes.
///
/// Implementations must be deterministic for a given dataset and artifact;
/// both calls run on the blocking thread pool.
pub trait Classifier: Send + Sync {
    /// Input raster size (width, height) the classifier expects.
    fn input_size(&self) -> (u32, u32);

    /// Fit a model to the dataset and return its serialized artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset cannot be fitted.
    fn fit(&self, dataset: &LabeledDataset) -> Result<Vec<u8>, ClassifierError>;

    /// Predict the label of one input. `Ok(None)` means no usable output.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact is unreadable or the input does not
    /// match.
    fn predict(
        &self,
        artifact: &[u8],
        input: &FeatureTensor,
    ) -> Result<Option<Prediction>, ClassifierError>;
}

/// Current [`CentroidModel`] artifact version.
pub const CENTROID_MODEL_VERSION: u32 = 1;

/// Serialized form of a fitted [`CentroidClassifier`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidModel {
    /// Artifact format version.
    pub model_version: u32,
    /// Input width.
    pub width: u32,
    /// Input height.
    pub height: u32,
    /// Class labels, parallel to `centroids`.
    pub classes: Vec<String>,
    /// Mean feature vector per class.
    pub centroids: Vec<Vec<f32>>,
    /// Softmax temperature applied to mean squared distances.
    pub temperature: f32,
}

impl CentroidModel {
    /// Validate dimensions and parameters.
    ///
    /// # Errors
    ///
    /// Returns a description of the first inconsistency found.
    pub fn validate(&self) -> Result<(), String> {
        if self.model_version > CENTROID_MODEL_VERSION {
            return Err(format!(
                "Unsupported model_version {} (expected <= {CENTROID_MODEL_VERSION})",
                self.model_version
            ));
        }
        if self.classes.is_empty() {
            return Err("No classes defined".to_string());
        }
        if self.centroids.len() != self.classes.len() {
            return Err("centroid count mismatch".to_string());
        }
        let dim = (self.width as usize) * (self.height as usize);
        if self.centroids.iter().any(|c| c.len() != dim) {
            return Err("centroid length mismatch".to_string());
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err("temperature must be > 0".to_string());
        }
        Ok(())
    }

    /// Class probabilities for one feature vector, parallel to `classes`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn predict_proba(&self, features: &[f32]) -> Vec<f32> {
        let dim = features.len();
        if dim == 0 {
            return Vec::new();
        }
        let temp = self.temperature.max(1e-6);
        let logits: Vec<f32> = self
            .centroids
            .iter()
            .map(|centroid| {
                let sq: f32 = centroid
                    .iter()
                    .zip(features)
                    .map(|(c, f)| (c - f) * (c - f))
                    .sum();
                -(sq / dim as f32) / temp
            })
            .collect();
        softmax(&logits)
    }
}

/// Numerically stable softmax.
#[must_use]
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return Vec::new();
    }
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return Vec::new();
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// Nearest-centroid classifier over ink intensity rasters.
///
/// Fitting averages every class's tensors; prediction is a softmax over
/// negative mean squared distances to each centroid.
#[derive(Debug, Clone)]
pub struct CentroidClassifier {
    width: u32,
    height: u32,
    temperature: f32,
}

impl Default for CentroidClassifier {
    fn default() -> Self {
        Self {
            width: DEFAULT_INPUT_SIZE,
            height: DEFAULT_INPUT_SIZE,
            temperature: 0.01,
        }
    }
}

impl CentroidClassifier {
    /// Create a classifier with a custom input size.
    #[must_use]
    pub fn with_input_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Set the softmax temperature. Lower values give sharper confidences.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn check_input(&self, input: &FeatureTensor) -> Result<(), ClassifierError> {
        if (input.width, input.height) != (self.width, self.height) {
            return Err(ClassifierError::InputMismatch {
                expected: (self.width, self.height),
                found: (input.width, input.height),
            });
        }
        Ok(())
    }
}

impl Classifier for CentroidClassifier {
    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[allow(clippy::cast_precision_loss)]
    fn fit(&self, dataset: &LabeledDataset) -> Result<Vec<u8>, ClassifierError> {
        if dataset.class_count() < 2 {
            return Err(ClassifierError::InvalidDataset(format!(
                "need at least 2 classes, found {}",
                dataset.class_count()
            )));
        }
        let dim = (self.width as usize) * (self.height as usize);
        let mut sums: BTreeMap<&str, (Vec<f32>, usize)> = BTreeMap::new();
        for (class, tensor) in dataset.iter() {
            self.check_input(tensor)?;
            let (sum, count) = sums
                .entry(class)
                .or_insert_with(|| (vec![0.0; dim], 0));
            for (acc, v) in sum.iter_mut().zip(&tensor.data) {
                *acc += v;
            }
            *count += 1;
        }

        let mut classes = Vec::with_capacity(sums.len());
        let mut centroids = Vec::with_capacity(sums.len());
        for (class, (sum, count)) in sums {
            let n = count.max(1) as f32;
            classes.push(class.to_string());
            centroids.push(sum.into_iter().map(|v| v / n).collect());
        }

        let model = CentroidModel {
            model_version: CENTROID_MODEL_VERSION,
            width: self.width,
            height: self.height,
            classes,
            centroids,
            temperature: self.temperature,
        };
        model.validate().map_err(ClassifierError::InvalidDataset)?;
        Ok(serde_json::to_vec(&model)?)
    }

    fn predict(
        &self,
        artifact: &[u8],
        input: &FeatureTensor,
    ) -> Result<Option<Prediction>, ClassifierError> {
        let model: CentroidModel = serde_json::from_slice(artifact)?;
        model.validate().map_err(ClassifierError::InvalidArtifact)?;
        if (input.width, input.height) != (model.width, model.height) {
            return Err(ClassifierError::InputMismatch {
                expected: (model.width, model.height),
                found: (input.width, input.height),
            });
        }

        let proba = model.predict_proba(&input.data);
        let best = proba
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, &p)| (idx, p));
        Ok(best.and_then(|(idx, confidence)| {
            model
                .classes
                .get(idx)
                .map(|emoji| Prediction::new(emoji.clone(), confidence))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(width: u32, height: u32, fill: impl Fn(u32, u32) -> f32) -> FeatureTensor {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(fill(x, y));
            }
        }
        FeatureTensor {
            width,
            height,
            data,
        }
    }

    fn dataset() -> LabeledDataset {
        // Vertical bar vs horizontal bar on an 8x8 grid.
        let vertical = |x: u32, _y: u32| if x == 4 { 1.0 } else { 0.0 };
        let horizontal = |_x: u32, y: u32| if y == 4 { 1.0 } else { 0.0 };
        let mut data = LabeledDataset::new();
        data.push("|", tensor(8, 8, vertical));
        data.push(
            "|",
            tensor(8, 8, |x, y| {
                if x == 3 || x == 4 {
                    vertical(x, y).max(0.5)
                } else {
                    0.0
                }
            }),
        );
        data.push("-", tensor(8, 8, horizontal));
        data.push(
            "-",
            tensor(8, 8, |x, y| {
                if y == 3 || y == 4 {
                    horizontal(x, y).max(0.5)
                } else {
                    0.0
                }
            }),
        );
        data
    }

    #[test]
    fn test_fit_and_predict() {
        let classifier = CentroidClassifier::with_input_size(8, 8);
        let artifact = classifier.fit(&dataset()).expect("fit");

        let input = tensor(8, 8, |x, _| if x == 4 { 1.0 } else { 0.0 });
        let prediction = classifier
            .predict(&artifact, &input)
            .expect("predict")
            .expect("some prediction");
        assert_eq!(prediction.emoji, "|");
        assert!(prediction.confidence > 0.9);
    }

    #[test]
    fn test_fit_requires_two_classes() {
        let classifier = CentroidClassifier::with_input_size(8, 8);
        let mut data = LabeledDataset::new();
        data.push("|", tensor(8, 8, |_, _| 0.0));
        assert!(matches!(
            classifier.fit(&data),
            Err(ClassifierError::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_input_size_mismatch() {
        let classifier = CentroidClassifier::with_input_size(8, 8);
        let artifact = classifier.fit(&dataset()).expect("fit");
        let wrong = tensor(4, 4, |_, _| 0.0);
        assert!(matches!(
            classifier.predict(&artifact, &wrong),
            Err(ClassifierError::InputMismatch { .. })
        ));
    }

    #[test]
    fn test_garbage_artifact_rejected() {
        let classifier = CentroidClassifier::with_input_size(8, 8);
        let input = tensor(8, 8, |_, _| 0.0);
        assert!(classifier.predict(b"not json", &input).is_err());
    }

    #[test]
    fn test_validate_catches_bad_temperature() {
        let model = CentroidModel {
            model_version: CENTROID_MODEL_VERSION,
            width: 1,
            height: 1,
            classes: vec!["a".into()],
            centroids: vec![vec![0.0]],
            temperature: 0.0,
        };
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = p.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(p[2] > p[1] && p[1] > p[0]);
        assert!(softmax(&[]).is_empty());
    }
}
