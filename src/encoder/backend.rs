//! Embedding backends for the sentence encoders.
//!
//! The [`EmbeddingGenerator`] trait is the seam between the engine and the
//! model runtime: encoders hand it raw text, it hands back fixed-width
//! vectors. The fastembed implementation produces 384-dimensional sentence
//! embeddings with the AllMiniLML6V2 model; tests use a deterministic mock.

use crate::types::{MatrixError, VectorDimension};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::Path;
use std::sync::Mutex;

/// Trait for generating embeddings from text.
///
/// Implementations of this trait should be thread-safe and
/// capable of handling batch processing efficiently.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts.
    ///
    /// # Arguments
    /// * `texts` - Slice of text strings to generate embeddings for
    ///
    /// # Returns
    /// A vector of embeddings, one for each input text, or an error
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, MatrixError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;
}

/// Maps a configured model name to its fastembed model and dimension.
///
/// Returns `None` for model names this build does not know.
#[must_use]
pub fn model_from_name(name: &str) -> Option<(EmbeddingModel, VectorDimension)> {
    // All supported models embed into 384 dimensions.
    match name {
        "AllMiniLML6V2" => Some((
            EmbeddingModel::AllMiniLML6V2,
            VectorDimension::dimension_384(),
        )),
        "AllMiniLML6V2Q" => Some((
            EmbeddingModel::AllMiniLML6V2Q,
            VectorDimension::dimension_384(),
        )),
        "BGESmallENV15" => Some((
            EmbeddingModel::BGESmallENV15,
            VectorDimension::dimension_384(),
        )),
        _ => None,
    }
}

/// FastEmbed implementation of the embedding backend.
///
/// # Performance
/// - Batch processing: ~1-10ms per embedding on average
/// - Memory: 384 * 4 bytes = 1536 bytes per embedding
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
}

impl FastEmbedGenerator {
    /// Create a new FastEmbed generator for the named model.
    ///
    /// # Errors
    /// Returns an error for an unknown model name or if the model fails
    /// to initialize or download.
    pub fn new(
        model_name: &str,
        cache_dir: &Path,
        show_download_progress: bool,
    ) -> Result<Self, MatrixError> {
        let (model, dimension) = model_from_name(model_name).ok_or_else(|| {
            MatrixError::EncodingFailed(format!("Unknown embedding model '{model_name}'"))
        })?;

        let model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| MatrixError::EncodingFailed(
            format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        Ok(Self {
            model: Mutex::new(model),
            dimension,
        })
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, MatrixError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // fastembed expects Vec<String> for the embed method
        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                MatrixError::EncodingFailed(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(text_strings, None)
            .map_err(|e| {
                MatrixError::EncodingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        // Validate dimensions
        for embedding in embeddings.iter() {
            if embedding.len() != self.dimension.get() {
                return Err(MatrixError::DimensionMismatch {
                    expected: self.dimension.get(),
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Mock embedding backend for testing.
///
/// Generates deterministic embeddings based on text content, useful for
/// unit tests that must not download a model.
#[cfg(test)]
pub struct MockEmbeddingGenerator {
    dimension: VectorDimension,
}

#[cfg(test)]
impl Default for MockEmbeddingGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl MockEmbeddingGenerator {
    /// Create a new mock backend with standard 384 dimensions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dimension: VectorDimension::dimension_384(),
        }
    }

    /// Create a backend with custom dimension for testing.
    #[must_use]
    pub fn with_dimension(dimension: VectorDimension) -> Self {
        Self { dimension }
    }
}

#[cfg(test)]
impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, MatrixError> {
        let dim = self.dimension.get();
        let mut embeddings = Vec::new();

        for text in texts {
            let lower = text.to_lowercase();

            // Create deterministic embeddings based on text content
            let mut embedding = vec![0.1; dim];

            // Add patterns based on common paper terms for testing
            if (lower.contains("virus") || lower.contains("viral")) && dim > 1 {
                embedding[0] = 0.9;
                embedding[1] = 0.8;
            }
            if lower.contains("climate") && dim > 3 {
                embedding[2] = 0.85;
                embedding[3] = 0.75;
            }
            if (lower.contains("neural") || lower.contains("network")) && dim > 5 {
                embedding[4] = 0.8;
                embedding[5] = 0.7;
            }
            if lower.contains("quantum") && dim > 7 {
                embedding[6] = 0.9;
                embedding[7] = 0.85;
            }

            // Normalize to unit length (like real embeddings)
            let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            if magnitude > 0.0 {
                for val in &mut embedding {
                    *val /= magnitude;
                }
            }

            embeddings.push(embedding);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}
