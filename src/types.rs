//! Core domain types shared across the engine.
//!
//! Identifiers, scores, and dimensions are newtypes so a bare integer
//! or float never crosses a module boundary with its meaning implicit.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use thiserror::Error;

/// Embedding width of the all-MiniLM-L6-v2 model.
pub const EMBEDDING_DIMENSION_384: usize = 384;

/// Identifier of a paper in the corpus.
///
/// Backed by `NonZeroU32`: ids start at 1, `Option<PaperId>` stays four
/// bytes, and a zeroed buffer can never pass for a real id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaperId(NonZeroU32);

impl PaperId {
    /// `None` when `id` is zero.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Construct from an id known to be non-zero.
    ///
    /// # Panics
    /// Panics on zero; reach for `new()` when the id is untrusted.
    #[must_use]
    pub fn new_unchecked(id: u32) -> Self {
        Self(NonZeroU32::new(id).expect("PaperId cannot be zero"))
    }

    /// The raw id value.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Little-endian encoding used by the artifact id table.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.get().to_le_bytes()
    }

    /// Decode from the artifact id table; `None` when the bytes are zero.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        let id = u32::from_le_bytes(bytes);
        Self::new(id)
    }
}

impl std::fmt::Display for PaperId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

/// Identifier of a topic.
///
/// Ids start at 1; zero-based cluster labels are offset on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicId(NonZeroU32);

impl TopicId {
    /// `None` when `id` is zero.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Construct from an id known to be non-zero.
    ///
    /// # Panics
    /// Panics on zero; reach for `new()` when the id is untrusted.
    #[must_use]
    pub fn new_unchecked(id: u32) -> Self {
        Self(NonZeroU32::new(id).expect("TopicId cannot be zero"))
    }

    /// The raw id value.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for TopicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

/// A similarity score in [0.0, 1.0].
///
/// The metrics guarantee the range; `new()` rejects anything outside
/// it, `saturating()` clamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score(f32);

impl Score {
    /// Validates the range and rejects NaN.
    pub fn new(value: f32) -> Result<Self, MatrixError> {
        if value.is_nan() {
            return Err(MatrixError::InvalidScore {
                value,
                reason: "Score cannot be NaN",
            });
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(MatrixError::InvalidScore {
                value,
                reason: "Score must be in range [0.0, 1.0]",
            });
        }
        Ok(Self(value))
    }

    /// Clamp into [0.0, 1.0]; NaN becomes 0.0.
    ///
    /// Used at metric boundaries where round-off can push a
    /// mathematically bounded value a few ulps outside the range.
    #[must_use]
    pub fn saturating(value: f32) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// No similarity.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    /// Perfect similarity.
    #[must_use]
    pub const fn one() -> Self {
        Self(1.0)
    }

    /// The raw score value.
    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .partial_cmp(&other.0)
            .expect("Score values should never be NaN")
    }
}

/// Width of the vectors a matrix or encoder works in.
///
/// Fixed per cache instance; checked wherever a row enters a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Rejects a zero dimension.
    pub fn new(dim: usize) -> Result<Self, MatrixError> {
        if dim == 0 {
            return Err(MatrixError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// The sentence-embedding default.
    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(EMBEDDING_DIMENSION_384)
    }

    /// The raw dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Checks that `vector` has exactly this width.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), MatrixError> {
        if vector.len() != self.0 {
            return Err(MatrixError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// A paper as the engine sees it: identity, text, and a staleness marker.
///
/// `vectorized` is maintained by the corpus owner; `false` means the text
/// changed since the paper was last encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub id: PaperId,
    pub doi: String,
    pub title: String,
    pub abstract_text: String,
    pub vectorized: bool,
}

impl Paper {
    pub fn new(
        id: PaperId,
        doi: impl Into<String>,
        title: impl Into<String>,
        abstract_text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            doi: doi.into(),
            title: title.into(),
            abstract_text: abstract_text.into(),
            vectorized: false,
        }
    }
}

/// An author known to the corpus, linked to the papers they wrote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub first_name: String,
    pub last_name: String,
    pub paper_ids: Vec<PaperId>,
}

/// A single ranked search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub paper_id: PaperId,
    pub score: f32,
}

impl SearchHit {
    #[must_use]
    pub fn new(paper_id: PaperId, score: f32) -> Self {
        Self { paper_id, score }
    }
}

/// Errors from matrix construction, persistence, and scoring.
///
/// Each message carries a suggestion line the CLI prints verbatim.
#[derive(Error, Debug)]
pub enum MatrixError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors come from the same encoder"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid score value: {value}\nReason: {reason}")]
    InvalidScore { value: f32, reason: &'static str },

    #[error("Storage error: {0}\nSuggestion: Check disk space and file permissions")]
    Storage(#[from] std::io::Error),

    #[error(
        "Encoding failed: {0}\nSuggestion: Verify the embedding backend is properly initialized"
    )]
    EncodingFailed(String),

    #[error(
        "Clustering failed: {0}\nSuggestion: Ensure sufficient papers are available for clustering (minimum: k papers)"
    )]
    ClusteringFailed(String),

    #[error(
        "Serialization error: {0}\nSuggestion: Check that the matrix artifact is valid and not corrupted"
    )]
    Serialization(String),

    #[error(
        "Paper not found in matrix: ID {0}\nSuggestion: Run an embedding update so the paper gets encoded"
    )]
    PaperNotFound(u32),

    #[error(
        "Invalid artifact version: expected {expected}, got {actual}\nSuggestion: Rebuild the matrix with the current version or use a compatible one"
    )]
    VersionMismatch { expected: u32, actual: u32 },
}
