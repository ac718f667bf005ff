//! Metadata sidecars for matrix artifacts.
//!
//! Each artifact carries a JSON sidecar recording which encoder produced
//! it, the model name, dimension, and row count, plus creation and update
//! timestamps. The sidecar is checked on load to catch artifacts written
//! by a newer format version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::matrix::storage::ArtifactError;

/// Metadata for a persisted embedding matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixMetadata {
    /// Key of the encoder that produced the matrix
    pub encoder: String,

    /// Name of the embedding model used
    pub model_name: String,

    /// Dimension of embeddings
    pub dimension: usize,

    /// Number of papers stored
    pub paper_count: usize,

    /// When the matrix was first created
    pub created_at: DateTime<Utc>,

    /// When the matrix was last updated
    pub updated_at: DateTime<Utc>,

    /// Version of the metadata format
    pub version: u32,
}

impl MatrixMetadata {
    /// Current metadata version
    const CURRENT_VERSION: u32 = 1;

    /// Create new metadata with current timestamps
    pub fn new(
        encoder: impl Into<String>,
        model_name: impl Into<String>,
        dimension: usize,
        paper_count: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            encoder: encoder.into(),
            model_name: model_name.into(),
            dimension,
            paper_count,
            created_at: now,
            updated_at: now,
            version: Self::CURRENT_VERSION,
        }
    }

    /// Update the metadata with a new paper count and timestamp
    pub fn update(&mut self, paper_count: usize) {
        self.paper_count = paper_count;
        self.updated_at = Utc::now();
    }

    /// Sidecar path for an artifact: `sentence.pmat` -> `sentence.meta.json`
    #[must_use]
    pub fn sidecar_path(artifact_path: &Path) -> PathBuf {
        artifact_path.with_extension("meta.json")
    }

    /// Save metadata to a JSON file
    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ArtifactError::InvalidFormat(format!("Failed to serialize metadata: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load metadata from a JSON file
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let json = std::fs::read_to_string(path)?;

        let metadata: Self = serde_json::from_str(&json).map_err(|e| {
            ArtifactError::InvalidFormat(format!(
                "Failed to parse metadata (the sidecar may be corrupted): {e}"
            ))
        })?;

        // Check version compatibility
        if metadata.version > Self::CURRENT_VERSION {
            return Err(ArtifactError::InvalidFormat(format!(
                "Metadata version {} is newer than supported version {}",
                metadata.version,
                Self::CURRENT_VERSION
            )));
        }

        Ok(metadata)
    }

    /// Check if a metadata file exists
    #[must_use]
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_metadata_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sentence.meta.json");

        let metadata = MatrixMetadata::new("sentence", "AllMiniLML6V2", 384, 1000);
        metadata.save(&path).unwrap();

        let loaded = MatrixMetadata::load(&path).unwrap();
        assert_eq!(loaded.encoder, metadata.encoder);
        assert_eq!(loaded.model_name, metadata.model_name);
        assert_eq!(loaded.dimension, metadata.dimension);
        assert_eq!(loaded.paper_count, metadata.paper_count);
        assert_eq!(loaded.version, MatrixMetadata::CURRENT_VERSION);
    }

    #[test]
    fn test_metadata_update() {
        let mut metadata = MatrixMetadata::new("sentence", "TestModel", 128, 100);
        let original_updated = metadata.updated_at;

        metadata.update(200);

        assert_eq!(metadata.paper_count, 200);
        assert!(metadata.updated_at >= original_updated);
        assert_eq!(metadata.version, MatrixMetadata::CURRENT_VERSION);
    }

    #[test]
    fn test_sidecar_path() {
        let sidecar = MatrixMetadata::sidecar_path(Path::new("/cache/sentence.pmat"));
        assert_eq!(sidecar, PathBuf::from("/cache/sentence.meta.json"));
    }

    #[test]
    fn test_version_compatibility() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("future.meta.json");

        let future_metadata = r#"{
            "encoder": "sentence",
            "model_name": "FutureModel",
            "dimension": 512,
            "paper_count": 0,
            "created_at": "2031-01-01T00:00:00Z",
            "updated_at": "2031-01-01T00:00:00Z",
            "version": 999
        }"#;
        std::fs::write(&path, future_metadata).unwrap();

        let result = MatrixMetadata::load(&path);
        assert!(result.is_err());
        match result.unwrap_err() {
            ArtifactError::InvalidFormat(message) => assert!(message.contains("version")),
            other => panic!("expected InvalidFormat, got {other:?}"),
        }
    }
}
