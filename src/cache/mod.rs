//! Persistent embedding cache over the paper corpus.
//!
//! Each encoder kind owns one artifact in the cache directory
//! (`sentence.pmat`, `chunked-sentence.pmat`, `topic-model.pmat`) plus a
//! metadata sidecar, and all kinds share a `timestamps.json` recording
//! when each artifact was last persisted.
//!
//! [`EmbeddingCache::update`] is incremental: it encodes only papers that
//! are new or stale, compacts out papers that vanished from the corpus,
//! and skips persistence entirely when nothing changed. Writes go through
//! a temp file rename, so readers never observe a half-written artifact.

mod handle;
mod sync;
mod timestamps;

pub use handle::CacheHandle;
pub use sync::{DirRemoteStore, RemoteStore, SyncClient, SyncReport};
pub use timestamps::{TIMESTAMP_FORMAT, Timestamps, format_timestamp, parse_timestamp};

use crate::config::Settings;
use crate::corpus::Corpus;
use crate::encoder::{Encoder, EncoderKind};
use crate::error::{EngineError, EngineResult};
use crate::matrix::{DenseMatrix, EmbeddingMatrix, MatrixArtifact, MatrixMetadata};
use crate::types::{Paper, PaperId, VectorDimension};
use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cap on failure entries carried in [`UpdateStats`]; the count keeps
/// going past it.
pub const MAX_REPORTED_FAILURES: usize = 100;

/// Outcome of a cache update.
#[derive(Debug, Default)]
pub struct UpdateStats {
    /// Papers in the corpus at update time.
    pub total_papers: usize,
    /// Papers freshly encoded and written into the matrix.
    pub encoded: usize,
    /// Papers that were already current.
    pub skipped: usize,
    /// Rows compacted out because their paper left the corpus.
    pub removed: usize,
    /// Papers that failed to encode, in full.
    pub failed: usize,
    /// Failure details, capped at [`MAX_REPORTED_FAILURES`].
    pub failures: Vec<(PaperId, String)>,
    pub elapsed: Duration,
}

impl UpdateStats {
    /// Whether this update changed the persisted artifact.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.encoded > 0 || self.removed > 0
    }

    fn push_failure(&mut self, id: PaperId, reason: String) {
        self.failed += 1;
        if self.failures.len() < MAX_REPORTED_FAILURES {
            self.failures.push((id, reason));
        }
    }
}

/// One encoder's embedding matrix, kept in sync with the corpus and disk.
pub struct EmbeddingCache {
    kind: EncoderKind,
    encoder: Arc<dyn Encoder>,
    model_name: String,
    artifact: MatrixArtifact,
    timestamps_path: PathBuf,
    batch_size: usize,
    title_importance: f32,
    matrix: RwLock<EmbeddingMatrix>,
    loaded_stamp: RwLock<Option<DateTime<Utc>>>,
}

impl EmbeddingCache {
    /// Opens the cache for an encoder, loading its artifact if present.
    ///
    /// An artifact whose dimension no longer matches the encoder (for
    /// example after refitting the topic model with a different topic
    /// count) is left on disk but ignored; the next update rebuilds it.
    pub fn open(settings: &Settings, encoder: Arc<dyn Encoder>) -> EngineResult<Self> {
        let kind = encoder.kind();
        let cache_dir = settings.cache_dir();
        let artifact = MatrixArtifact::new(cache_dir.join(format!("{}.pmat", kind.key())));
        let timestamps_path = cache_dir.join(Timestamps::FILE_NAME);

        let dimension = encoder.dimension();
        let mut matrix = EmbeddingMatrix::new(dimension);
        let mut loaded_stamp = None;
        if artifact.exists() {
            let loaded = artifact.load().map_err(|e| EngineError::LoadError {
                path: artifact.path().to_path_buf(),
                source: Box::new(e),
            })?;
            if loaded.dimension() == dimension {
                matrix = loaded;
                loaded_stamp = Timestamps::load(&timestamps_path)?.get(kind.key());
            } else {
                tracing::warn!(
                    "artifact dimension {} does not match encoder dimension {}, starting empty",
                    loaded.dimension().get(),
                    dimension.get()
                );
            }
        }

        Ok(Self {
            kind,
            model_name: model_name_for(settings, kind),
            encoder,
            artifact,
            timestamps_path,
            batch_size: settings.cache.batch_size.max(1),
            title_importance: settings.cache.title_importance,
            matrix: RwLock::new(matrix),
            loaded_stamp: RwLock::new(loaded_stamp),
        })
    }

    #[must_use]
    pub fn kind(&self) -> EncoderKind {
        self.kind
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.encoder.dimension()
    }

    /// The encoder backing this cache.
    #[must_use]
    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.matrix.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matrix.read().is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: PaperId) -> bool {
        self.matrix.read().contains(id)
    }

    #[must_use]
    pub fn artifact_path(&self) -> &Path {
        self.artifact.path()
    }

    #[must_use]
    pub fn title_importance(&self) -> f32 {
        self.title_importance
    }

    /// Read access to the in-memory matrix.
    pub fn matrix(&self) -> RwLockReadGuard<'_, EmbeddingMatrix> {
        self.matrix.read()
    }

    /// Title and abstract rows blended by the configured title weight.
    #[must_use]
    pub fn blended_matrix(&self) -> DenseMatrix {
        self.matrix.read().blended(self.title_importance)
    }

    /// When this cache's artifact was last persisted, per the timestamp
    /// file.
    pub fn last_updated(&self) -> EngineResult<Option<DateTime<Utc>>> {
        Ok(Timestamps::load(&self.timestamps_path)?.get(self.kind.key()))
    }

    /// Brings the matrix in line with the corpus.
    ///
    /// Encodes papers that are unvectorized or missing a row (all papers
    /// with `force`), compacts out rows of papers no longer in the corpus,
    /// persists, and only then marks the encoded papers vectorized. When
    /// nothing changed this performs zero encoder calls and leaves the
    /// artifact untouched.
    pub fn update(&self, corpus: &dyn Corpus, force: bool) -> EngineResult<UpdateStats> {
        let started = Instant::now();
        let papers = corpus.papers();
        let corpus_ids: HashSet<PaperId> = papers.iter().map(|p| p.id).collect();

        let mut stats = UpdateStats {
            total_papers: papers.len(),
            ..UpdateStats::default()
        };

        let (to_encode, vanished) = {
            let matrix = self.matrix.read();
            let to_encode: Vec<Paper> = papers
                .iter()
                .filter(|p| force || !p.vectorized || !matrix.contains(p.id))
                .cloned()
                .collect();
            let vanished = matrix.ids().iter().any(|id| !corpus_ids.contains(id));
            (to_encode, vanished)
        };

        if to_encode.is_empty() && !vanished {
            stats.skipped = papers.len();
            stats.elapsed = started.elapsed();
            tracing::debug!(kind = %self.kind, "cache already current, nothing to encode");
            return Ok(stats);
        }
        stats.skipped = papers.len() - to_encode.len();

        // Encode outside the lock; the write section below is short.
        let mut rows: Vec<(PaperId, Vec<f32>, Vec<f32>)> = Vec::with_capacity(to_encode.len());
        let mut succeeded: Vec<PaperId> = Vec::with_capacity(to_encode.len());
        for chunk in to_encode.chunks(self.batch_size) {
            tracing::debug!(kind = %self.kind, batch = chunk.len(), "encoding batch");
            let batch = self.encoder.encode(chunk)?;
            for (i, paper) in chunk.iter().enumerate() {
                if batch.failed(paper.id) {
                    let reason = batch
                        .failures
                        .iter()
                        .find(|(id, _)| *id == paper.id)
                        .map(|(_, r)| r.clone())
                        .unwrap_or_default();
                    tracing::warn!(paper = %paper.id, "encoding failed: {reason}");
                    stats.push_failure(paper.id, reason);
                    continue;
                }
                rows.push((
                    paper.id,
                    batch.titles.row(i).to_vec(),
                    batch.abstracts.row(i).to_vec(),
                ));
                succeeded.push(paper.id);
            }
        }

        {
            let mut matrix = self.matrix.write();
            stats.removed = matrix.retain_ids(&corpus_ids);
            for (id, title_row, abstract_row) in &rows {
                matrix.upsert(*id, title_row, abstract_row)?;
                stats.encoded += 1;
            }
            let matrix = RwLockWriteGuard::downgrade(matrix);
            self.persist(&matrix)?;
        }

        // Marking happens after a successful persist, so a crash in
        // between re-encodes rather than losing rows.
        if !succeeded.is_empty() {
            corpus.mark_vectorized(&succeeded);
        }

        stats.elapsed = started.elapsed();
        tracing::info!(
            kind = %self.kind,
            encoded = stats.encoded,
            removed = stats.removed,
            failed = stats.failed,
            "cache update finished"
        );
        Ok(stats)
    }

    /// Reloads the matrix when the persisted artifact is strictly newer
    /// than what this instance holds, as after a pull or an update in
    /// another process. Returns whether a reload happened.
    pub fn reload_if_stale(&self) -> EngineResult<bool> {
        let on_disk = Timestamps::load(&self.timestamps_path)?.get(self.kind.key());
        let in_memory = *self.loaded_stamp.read();
        let newer = match (on_disk, in_memory) {
            (Some(disk), Some(memory)) => disk > memory,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !newer || !self.artifact.exists() {
            return Ok(false);
        }

        let reloaded = self.artifact.load().map_err(|e| EngineError::LoadError {
            path: self.artifact.path().to_path_buf(),
            source: Box::new(e),
        })?;
        if reloaded.dimension() != self.encoder.dimension() {
            tracing::warn!(kind = %self.kind, "not reloading artifact with mismatched dimension");
            return Ok(false);
        }

        *self.matrix.write() = reloaded;
        *self.loaded_stamp.write() = on_disk;
        tracing::info!(kind = %self.kind, "reloaded cache from newer artifact");
        Ok(true)
    }

    fn persist(&self, matrix: &EmbeddingMatrix) -> EngineResult<()> {
        self.artifact
            .save(matrix)
            .map_err(|e| EngineError::PersistenceError {
                path: self.artifact.path().to_path_buf(),
                source: Box::new(e),
            })?;

        let sidecar = MatrixMetadata::sidecar_path(self.artifact.path());
        let mut metadata = match MatrixMetadata::load(&sidecar) {
            Ok(existing) => existing,
            // Missing or corrupted sidecars are rebuilt from scratch
            Err(_) => MatrixMetadata::new(
                self.kind.key(),
                &self.model_name,
                matrix.dimension().get(),
                matrix.len(),
            ),
        };
        metadata.update(matrix.len());
        metadata
            .save(&sidecar)
            .map_err(|e| EngineError::PersistenceError {
                path: sidecar.clone(),
                source: Box::new(e),
            })?;

        let mut stamps = Timestamps::load(&self.timestamps_path)?;
        stamps.stamp(self.kind.key());
        stamps.save(&self.timestamps_path)?;
        *self.loaded_stamp.write() = stamps.get(self.kind.key());
        Ok(())
    }
}

fn model_name_for(settings: &Settings, kind: EncoderKind) -> String {
    match kind {
        EncoderKind::Sentence | EncoderKind::ChunkedSentence => settings.encoder.model.clone(),
        EncoderKind::TopicModel => settings.encoder.topic_model_file.clone(),
    }
}
