//! Labeled feature datasets, grouped per class.

use std::collections::BTreeMap;

use doodle_renderer::FeatureTensor;

/// Feature tensors grouped by emoji label.
#[derive(Debug, Clone, Default)]
pub struct LabeledDataset {
    classes: BTreeMap<String, Vec<FeatureTensor>>,
}

impl LabeledDataset {
    /// Create an empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one example for a class.
    pub fn push(&mut self, label: impl Into<String>, features: FeatureTensor) {
        self.classes.entry(label.into()).or_default().push(features);
    }

    /// Number of distinct classes.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Total number of examples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.values().map(Vec::len).sum()
    }

    /// True when there are no examples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class labels in sorted order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Examples of one class.
    #[must_use]
    pub fn examples(&self, label: &str) -> &[FeatureTensor] {
        self.classes.get(label).map_or(&[], Vec::as_slice)
    }

    /// Every (label, example) pair, grouped by class.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureTensor)> {
        self.classes
            .iter()
            .flat_map(|(label, tensors)| tensors.iter().map(move |t| (label.as_str(), t)))
    }
}
