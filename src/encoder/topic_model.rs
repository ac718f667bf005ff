//! Topic-model encoder backed by a fitted artifact.
//!
//! The artifact maps vocabulary terms to per-topic probability
//! distributions. A document's vector is the normalized sum of the
//! distributions of its in-vocabulary terms, so rows are themselves
//! probability distributions and pair with the Jensen-Shannon metric.
//! No embedding backend is involved; encoding is deterministic and cannot
//! fail per document.

use super::{EncodedBatch, Encoder, EncoderKind};
use crate::error::{EngineError, EngineResult};
use crate::matrix::DenseMatrix;
use crate::types::{Paper, VectorDimension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// On-disk form of a fitted topic model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicModelArtifact {
    /// Name of the model that produced the distributions.
    pub model_name: String,
    /// Number of topics; the width of every vocabulary entry.
    pub topic_count: usize,
    /// Per-term topic distributions.
    pub vocabulary: HashMap<String, Vec<f32>>,
}

impl TopicModelArtifact {
    /// Writes the artifact as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::FileWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::General(format!("Failed to serialize topic model: {e}")))?;
        std::fs::write(path, json).map_err(|e| EngineError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Encoder over a fitted topic model artifact.
#[derive(Debug)]
pub struct TopicModelEncoder {
    dimension: VectorDimension,
    vocabulary: HashMap<String, Vec<f32>>,
}

impl TopicModelEncoder {
    /// Loads the artifact from disk.
    ///
    /// A missing file means the encoder was never fitted and maps to
    /// [`EngineError::EncoderNotReady`]; a malformed file maps to
    /// [`EngineError::LoadError`].
    pub fn load(path: &Path) -> EngineResult<Self> {
        if !path.exists() {
            return Err(EngineError::EncoderNotReady {
                kind: EncoderKind::TopicModel,
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|e| EngineError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let artifact: TopicModelArtifact =
            serde_json::from_str(&raw).map_err(|e| EngineError::LoadError {
                path: path.to_path_buf(),
                source: Box::new(e),
            })?;
        Self::from_artifact(artifact).map_err(|reason| EngineError::LoadError {
            path: path.to_path_buf(),
            source: reason.into(),
        })
    }

    /// Validates an artifact and builds the encoder from it.
    pub fn from_artifact(artifact: TopicModelArtifact) -> Result<Self, String> {
        let dimension = VectorDimension::new(artifact.topic_count)
            .map_err(|_| "topic model has zero topics".to_string())?;
        for (term, dist) in &artifact.vocabulary {
            if dist.len() != artifact.topic_count {
                return Err(format!(
                    "term '{term}' has {} entries, expected {}",
                    dist.len(),
                    artifact.topic_count
                ));
            }
            if dist.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(format!("term '{term}' has a negative or non-finite entry"));
            }
        }
        Ok(Self {
            dimension,
            vocabulary: artifact.vocabulary,
        })
    }

    /// Topic distribution for a piece of text.
    ///
    /// Documents with no in-vocabulary terms get the uniform distribution,
    /// so every row stays a valid probability vector.
    #[must_use]
    pub fn distribution(&self, text: &str) -> Vec<f32> {
        let topic_count = self.dimension.get();
        let mut sum = vec![0.0f32; topic_count];
        let mut hits = 0usize;

        for term in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 2)
        {
            if let Some(dist) = self.vocabulary.get(&term.to_lowercase()) {
                for (s, v) in sum.iter_mut().zip(dist) {
                    *s += v;
                }
                hits += 1;
            }
        }

        let total: f32 = sum.iter().sum();
        if hits == 0 || total <= f32::EPSILON {
            return vec![1.0 / topic_count as f32; topic_count];
        }
        for s in &mut sum {
            *s /= total;
        }
        sum
    }
}

impl Encoder for TopicModelEncoder {
    fn kind(&self) -> EncoderKind {
        EncoderKind::TopicModel
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn encode(&self, papers: &[Paper]) -> EngineResult<EncodedBatch> {
        let dimension = self.dimension.get();
        let mut titles = DenseMatrix::with_capacity(dimension, papers.len());
        let mut abstracts = DenseMatrix::with_capacity(dimension, papers.len());

        for paper in papers {
            titles.push_row(&self.distribution(&paper.title))?;
            abstracts.push_row(&self.distribution(&paper.abstract_text))?;
        }

        Ok(EncodedBatch {
            titles,
            abstracts,
            failures: Vec::new(),
        })
    }

    fn encode_query(&self, query: &str) -> EngineResult<Vec<f32>> {
        Ok(self.distribution(query))
    }
}
