//! # Classification History
//!
//! Bounded, append-only log of recognition outcomes.
//!
//! ```text
//! record() ──► [oldest ... newest]   (len <= capacity)
//!                 ▲ dropped first
//! ```
//!
//! The history is used for statistics only; recognition decisions never read
//! it.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::entity::{ClassificationResult, ModelId};

/// Number of results kept by default.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Bounded history of classification results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationHistory {
    /// Results, oldest first.
    entries: VecDeque<ClassificationResult>,
    /// Maximum number of results retained.
    capacity: usize,
}

impl ClassificationHistory {
    /// Create an empty history with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create an empty history with a custom capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Rebuild a history from persisted results, keeping the newest ones.
    #[must_use]
    pub fn from_entries(entries: Vec<ClassificationResult>) -> Self {
        let mut history = Self::new();
        for entry in entries {
            history.record(entry);
        }
        history
    }

    /// Append a result, dropping the oldest if at capacity.
    pub fn record(&mut self, result: ClassificationResult) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(result);
    }

    /// Number of results retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of results retained.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Results, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ClassificationResult> {
        self.entries.iter()
    }

    /// Owned copy of the results, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<ClassificationResult> {
        self.entries.iter().cloned().collect()
    }

    /// Remove every result.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Remove results produced by a model.
    pub fn remove_model(&mut self, model_id: ModelId) {
        self.entries.retain(|r| r.model_id != model_id);
    }

    /// Per-emoji counts and mean confidence, optionally limited to one model.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self, model_id: Option<ModelId>) -> Vec<EmojiStats> {
        let mut acc: BTreeMap<&str, (usize, f32)> = BTreeMap::new();
        for result in self
            .entries
            .iter()
            .filter(|r| model_id.map_or(true, |m| r.model_id == m))
        {
            let slot = acc.entry(result.emoji.as_str()).or_insert((0, 0.0));
            slot.0 += 1;
            slot.1 += result.confidence;
        }
        acc.into_iter()
            .map(|(emoji, (count, total))| EmojiStats {
                emoji: emoji.to_string(),
                count,
                mean_confidence: total / count as f32,
            })
            .collect()
    }
}

impl Default for ClassificationHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregated recognition statistics for one emoji.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmojiStats {
    /// The emoji.
    pub emoji: String,
    /// Number of recorded recognitions.
    pub count: usize,
    /// Mean classifier confidence.
    pub mean_confidence: f32,
}
