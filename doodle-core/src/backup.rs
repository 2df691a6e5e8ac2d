//! Backup bundles - everything needed to restore a user's training data.
//!
//! A bundle carries every store collection plus the trained artifact blobs
//! (base64) and a format version. Restoring refuses bundles written by a newer
//! format.

use std::collections::BTreeMap;
use std::path::Path;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::entity::{
    now_ms, AppSettings, ClassificationResult, LabelInfo, ModelId, ModelInfo, PlaygroundItem,
    TrainingSample,
};
use crate::error::{StoreError, StoreResult};

/// Highest bundle format this build reads and the version it writes.
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// Serialized snapshot of all persisted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupBundle {
    /// Bundle format version.
    pub format_version: u32,
    /// Export time (ms since epoch).
    pub exported_at: u64,
    /// All training samples.
    pub samples: Vec<TrainingSample>,
    /// All models.
    pub models: Vec<ModelInfo>,
    /// All labels.
    pub labels: Vec<LabelInfo>,
    /// User settings.
    #[serde(default)]
    pub settings: AppSettings,
    /// Classification history, oldest first.
    #[serde(default)]
    pub history: Vec<ClassificationResult>,
    /// Placed playground emoji.
    #[serde(default)]
    pub playground: Vec<PlaygroundItem>,
    /// Trained artifacts keyed by model, base64 encoded.
    #[serde(default)]
    pub artifacts: BTreeMap<ModelId, String>,
}

impl BackupBundle {
    /// Create an empty bundle at the current format version.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            format_version: BACKUP_FORMAT_VERSION,
            exported_at: now_ms(),
            samples: Vec::new(),
            models: Vec::new(),
            labels: Vec::new(),
            settings: AppSettings::default(),
            history: Vec::new(),
            playground: Vec::new(),
            artifacts: BTreeMap::new(),
        }
    }

    /// Attach an artifact blob for a model.
    pub fn insert_artifact(&mut self, model_id: ModelId, bytes: &[u8]) {
        self.artifacts.insert(
            model_id,
            base64::engine::general_purpose::STANDARD.encode(bytes),
        );
    }

    /// Ensure this build can read the bundle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedBackupVersion`] for newer bundles.
    pub fn check_version(&self) -> StoreResult<()> {
        if self.format_version > BACKUP_FORMAT_VERSION {
            return Err(StoreError::UnsupportedBackupVersion {
                found: self.format_version,
                supported: BACKUP_FORMAT_VERSION,
            });
        }
        Ok(())
    }

    /// Decode every artifact blob.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArtifactEncoding`] for the first blob that
    /// is not valid base64.
    pub fn decode_artifacts(&self) -> StoreResult<Vec<(ModelId, Vec<u8>)>> {
        self.artifacts
            .iter()
            .map(|(model_id, encoded)| {
                base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map(|bytes| (*model_id, bytes))
                    .map_err(|e| StoreError::InvalidArtifactEncoding {
                        model_id: model_id.to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect()
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a bundle from JSON without checking its version.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write the bundle to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_to(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read a bundle from a file and check its version.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the bundle
    /// was written by a newer format.
    pub fn read_from(path: impl AsRef<Path>) -> StoreResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let bundle = Self::from_json(&contents)?;
        bundle.check_version()?;
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_version_rejected() {
        let mut bundle = BackupBundle::empty();
        assert!(bundle.check_version().is_ok());

        bundle.format_version = BACKUP_FORMAT_VERSION + 1;
        assert!(matches!(
            bundle.check_version(),
            Err(StoreError::UnsupportedBackupVersion { found, supported })
                if found == BACKUP_FORMAT_VERSION + 1 && supported == BACKUP_FORMAT_VERSION
        ));
    }

    #[test]
    fn test_artifacts_survive_json() {
        let model = ModelId::new();
        let mut bundle = BackupBundle::empty();
        bundle.insert_artifact(model, &[0, 1, 2, 254, 255]);

        let json = bundle.to_json().expect("serialize");
        let restored = BackupBundle::from_json(&json).expect("parse");
        let artifacts = restored.decode_artifacts().expect("decode");
        assert_eq!(artifacts, vec![(model, vec![0, 1, 2, 254, 255])]);
    }

    #[test]
    fn test_invalid_artifact_encoding() {
        let mut bundle = BackupBundle::empty();
        bundle.artifacts.insert(ModelId::new(), "not base64!!".to_string());
        assert!(matches!(
            bundle.decode_artifacts(),
            Err(StoreError::InvalidArtifactEncoding { .. })
        ));
    }

    #[test]
    fn test_read_from_rejects_newer_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("backup.json");
        let mut bundle = BackupBundle::empty();
        bundle.format_version = 99;
        bundle.write_to(&path).expect("write");

        assert!(matches!(
            BackupBundle::read_from(&path),
            Err(StoreError::UnsupportedBackupVersion { found: 99, .. })
        ));
    }
}
