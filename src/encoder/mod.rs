//! Document encoders and the registry that owns them.
//!
//! Three encoders turn papers into matrix rows:
//! - `topic-model`: probability distributions from a fitted topic model,
//!   compared with the Jensen-Shannon metric
//! - `sentence`: one embedding per title and abstract
//! - `chunked-sentence`: overlapping word windows over long abstracts,
//!   averaged into a single vector
//!
//! The [`EncoderRegistry`] constructs encoders on demand, caches them, and
//! shares a single embedding backend between the two sentence variants so
//! the model is loaded at most once per process.

mod backend;
mod chunked;
mod sentence;
mod topic_model;

#[cfg(test)]
pub use backend::MockEmbeddingGenerator;
pub use backend::{EmbeddingGenerator, FastEmbedGenerator, model_from_name};
pub use chunked::ChunkedSentenceEncoder;
pub use sentence::SentenceEncoder;
pub use topic_model::{TopicModelArtifact, TopicModelEncoder};

use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use crate::matrix::DenseMatrix;
use crate::types::{MatrixError, Paper, PaperId, VectorDimension};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The encoder families the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncoderKind {
    TopicModel,
    Sentence,
    ChunkedSentence,
}

impl EncoderKind {
    /// Every kind, in a stable order.
    pub const ALL: [EncoderKind; 3] = [Self::TopicModel, Self::Sentence, Self::ChunkedSentence];

    /// Stable key used for artifact file names and timestamp entries.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Self::TopicModel => "topic-model",
            Self::Sentence => "sentence",
            Self::ChunkedSentence => "chunked-sentence",
        }
    }
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for EncoderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "topic-model" | "topic_model" => Ok(Self::TopicModel),
            "sentence" => Ok(Self::Sentence),
            "chunked-sentence" | "chunked_sentence" => Ok(Self::ChunkedSentence),
            other => Err(format!(
                "Unknown encoder '{other}'. Valid encoders: topic-model, sentence, chunked-sentence"
            )),
        }
    }
}

/// Output of encoding a batch of papers.
///
/// Row `i` of both matrices belongs to the paper at position `i` of the
/// input slice. Papers whose text could not be embedded keep zero rows and
/// are listed in `failures` so callers can retry them on a later update.
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    pub titles: DenseMatrix,
    pub abstracts: DenseMatrix,
    pub failures: Vec<(PaperId, String)>,
}

impl EncodedBatch {
    /// Number of encoded papers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.titles.rows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.titles.rows() == 0
    }

    /// Whether the given paper failed to encode.
    #[must_use]
    pub fn failed(&self, id: PaperId) -> bool {
        self.failures.iter().any(|(failed, _)| *failed == id)
    }
}

/// A document encoder.
///
/// Encoders are stateless after construction and safe to share across
/// threads behind an `Arc`.
pub trait Encoder: Send + Sync {
    /// Which encoder family this is.
    fn kind(&self) -> EncoderKind;

    /// Width of every produced row.
    fn dimension(&self) -> VectorDimension;

    /// Encode titles and abstracts for a batch of papers.
    ///
    /// Returns one title row and one abstract row per input paper, in
    /// input order. Per-document failures are isolated: the affected paper
    /// gets zero rows and an entry in [`EncodedBatch::failures`] instead of
    /// sinking the whole batch.
    fn encode(&self, papers: &[Paper]) -> EngineResult<EncodedBatch>;

    /// Encode a free-text query into a single vector.
    fn encode_query(&self, query: &str) -> EngineResult<Vec<f32>>;
}

/// Embeds one text per paper, isolating per-document failures.
///
/// The whole batch goes to the backend in one call. If that call fails,
/// every text is retried on its own; documents that still fail get a zero
/// row and a failure entry.
pub(crate) fn embed_with_fallback(
    backend: &dyn EmbeddingGenerator,
    ids: &[PaperId],
    texts: &[&str],
) -> Result<(DenseMatrix, Vec<(PaperId, String)>), MatrixError> {
    debug_assert_eq!(ids.len(), texts.len());

    let dimension = backend.dimension().get();
    let mut matrix = DenseMatrix::with_capacity(dimension, texts.len());
    let mut failures = Vec::new();

    match backend.generate_embeddings(texts) {
        Ok(rows) => {
            for row in &rows {
                matrix.push_row(row)?;
            }
        }
        Err(batch_error) => {
            tracing::warn!("batch embedding failed, retrying per document: {batch_error}");
            let zero = vec![0.0; dimension];
            for (id, text) in ids.iter().zip(texts) {
                match backend.generate_embeddings(&[text]) {
                    Ok(rows) => match rows.first() {
                        Some(row) => matrix.push_row(row)?,
                        None => {
                            matrix.push_row(&zero)?;
                            failures.push((*id, "backend returned no embedding".to_string()));
                        }
                    },
                    Err(e) => {
                        matrix.push_row(&zero)?;
                        failures.push((*id, e.to_string()));
                    }
                }
            }
        }
    }

    Ok((matrix, failures))
}

/// Constructs and caches encoders, sharing one embedding backend.
///
/// The backend holds the loaded model and is expensive to build, so it is
/// created lazily on first use and reused by every sentence encoder. The
/// topic-model encoder instead loads its fitted artifact from the models
/// directory.
pub struct EncoderRegistry {
    settings: Settings,
    backend: RwLock<Option<Arc<dyn EmbeddingGenerator>>>,
    encoders: RwLock<HashMap<EncoderKind, Arc<dyn Encoder>>>,
    initializing: AtomicBool,
}

impl EncoderRegistry {
    /// Creates a registry that builds its backend lazily from settings.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            backend: RwLock::new(None),
            encoders: RwLock::new(HashMap::new()),
            initializing: AtomicBool::new(false),
        }
    }

    /// Creates a registry with a pre-built backend.
    ///
    /// Used when the caller already holds a model instance, and by tests
    /// that substitute a deterministic backend.
    #[must_use]
    pub fn with_backend(settings: Settings, backend: Arc<dyn EmbeddingGenerator>) -> Self {
        Self {
            settings,
            backend: RwLock::new(Some(backend)),
            encoders: RwLock::new(HashMap::new()),
            initializing: AtomicBool::new(false),
        }
    }

    /// The settings this registry was built from.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The configured default encoder kind.
    pub fn default_kind(&self) -> EngineResult<EncoderKind> {
        self.settings
            .encoder
            .default_kind
            .parse()
            .map_err(|reason| EngineError::ConfigError { reason })
    }

    /// Returns the encoder for `kind`, constructing it on first use.
    pub fn create(&self, kind: EncoderKind) -> EngineResult<Arc<dyn Encoder>> {
        if let Some(encoder) = self.encoders.read().get(&kind).cloned() {
            return Ok(encoder);
        }

        let encoder: Arc<dyn Encoder> = match kind {
            EncoderKind::Sentence => Arc::new(SentenceEncoder::new(self.backend()?)),
            EncoderKind::ChunkedSentence => Arc::new(ChunkedSentenceEncoder::new(
                self.backend()?,
                self.settings.encoder.chunk_size,
                self.settings.encoder.chunk_overlap,
                self.settings.encoder.max_chunks,
            )),
            EncoderKind::TopicModel => {
                Arc::new(TopicModelEncoder::load(&self.settings.topic_model_path())?)
            }
        };

        // Two threads may build concurrently; the first insert wins and
        // both callers get the same cached instance afterwards.
        let mut cache = self.encoders.write();
        Ok(cache.entry(kind).or_insert(encoder).clone())
    }

    /// Replaces the cached encoder for its kind with a pre-built one.
    pub fn register(&self, encoder: Arc<dyn Encoder>) {
        self.encoders.write().insert(encoder.kind(), encoder);
    }

    /// Whether `kind` can encode without further setup work.
    ///
    /// Sentence encoders are ready once the shared backend is loaded; the
    /// topic-model encoder is ready when its fitted artifact exists.
    #[must_use]
    pub fn is_ready(&self, kind: EncoderKind) -> bool {
        if self.encoders.read().contains_key(&kind) {
            return true;
        }
        match kind {
            EncoderKind::Sentence | EncoderKind::ChunkedSentence => self.backend.read().is_some(),
            EncoderKind::TopicModel => self.settings.topic_model_path().exists(),
        }
    }

    /// Eagerly constructs the given encoders.
    ///
    /// [`Self::is_initializing`] reports `true` for the duration, so status
    /// probes can distinguish "loading" from "missing".
    pub fn initialize(&self, kinds: &[EncoderKind]) -> EngineResult<()> {
        self.initializing.store(true, Ordering::SeqCst);
        let result = kinds.iter().try_for_each(|&kind| self.create(kind).map(|_| ()));
        self.initializing.store(false, Ordering::SeqCst);
        result
    }

    /// Whether an [`Self::initialize`] call is currently running.
    #[must_use]
    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::SeqCst)
    }

    /// Drops all cached encoders and the shared backend.
    ///
    /// Releases model memory; later `create` calls start from scratch.
    pub fn shutdown(&self) {
        self.encoders.write().clear();
        *self.backend.write() = None;
    }

    fn backend(&self) -> EngineResult<Arc<dyn EmbeddingGenerator>> {
        if let Some(backend) = self.backend.read().clone() {
            return Ok(backend);
        }

        let mut slot = self.backend.write();
        // Another thread may have won the race while we waited.
        if let Some(backend) = slot.clone() {
            return Ok(backend);
        }

        tracing::info!(model = %self.settings.encoder.model, "loading embedding backend");
        let generator = FastEmbedGenerator::new(
            &self.settings.encoder.model,
            &self.settings.models_dir(),
            self.settings.encoder.show_download_progress,
        )?;
        let backend: Arc<dyn EmbeddingGenerator> = Arc::new(generator);
        *slot = Some(backend.clone());
        Ok(backend)
    }
}
