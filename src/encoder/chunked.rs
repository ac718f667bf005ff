//! Chunked sentence encoder for long abstracts.
//!
//! The embedding model truncates long inputs, so abstracts are split into
//! overlapping word windows which are embedded separately and averaged into
//! one vector. Titles are short and stay unchunked.

use super::{EmbeddingGenerator, EncodedBatch, Encoder, EncoderKind, embed_with_fallback};
use crate::error::{EngineError, EngineResult};
use crate::matrix::DenseMatrix;
use crate::types::{Paper, PaperId, VectorDimension};
use std::ops::Range;
use std::sync::Arc;

/// Encodes abstracts as the mean of overlapping word-window embeddings.
pub struct ChunkedSentenceEncoder {
    backend: Arc<dyn EmbeddingGenerator>,
    chunk_size: usize,
    chunk_overlap: usize,
    max_chunks: usize,
}

impl ChunkedSentenceEncoder {
    /// Creates an encoder with the given window geometry.
    ///
    /// A zero `chunk_size` or `max_chunks` is clamped to one; an overlap
    /// at or above the chunk size is clamped so windows always advance.
    #[must_use]
    pub fn new(
        backend: Arc<dyn EmbeddingGenerator>,
        chunk_size: usize,
        chunk_overlap: usize,
        max_chunks: usize,
    ) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            backend,
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            max_chunks: max_chunks.max(1),
        }
    }

    fn chunk_text(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() && chunks.len() < self.max_chunks {
            let end = (start + self.chunk_size).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end == words.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}

/// Mean of the given rows; no rows yields a zero vector.
fn average_rows(rows: &[Vec<f32>], dimension: usize) -> Vec<f32> {
    if rows.is_empty() {
        return vec![0.0; dimension];
    }
    let mut mean = vec![0.0; dimension];
    for row in rows {
        for (m, v) in mean.iter_mut().zip(row) {
            *m += v;
        }
    }
    let count = rows.len() as f32;
    for m in &mut mean {
        *m /= count;
    }
    mean
}

impl Encoder for ChunkedSentenceEncoder {
    fn kind(&self) -> EncoderKind {
        EncoderKind::ChunkedSentence
    }

    fn dimension(&self) -> VectorDimension {
        self.backend.dimension()
    }

    fn encode(&self, papers: &[Paper]) -> EngineResult<EncodedBatch> {
        let ids: Vec<PaperId> = papers.iter().map(|p| p.id).collect();
        let titles: Vec<&str> = papers.iter().map(|p| p.title.as_str()).collect();
        let (title_matrix, mut failures) =
            embed_with_fallback(self.backend.as_ref(), &ids, &titles)?;

        // Chunk every abstract up front so one backend call covers the
        // whole batch; spans remember which rows belong to which paper.
        let mut all_chunks: Vec<String> = Vec::new();
        let mut spans: Vec<Range<usize>> = Vec::with_capacity(papers.len());
        for paper in papers {
            let chunks = self.chunk_text(&paper.abstract_text);
            let start = all_chunks.len();
            all_chunks.extend(chunks);
            spans.push(start..all_chunks.len());
        }

        let dimension = self.backend.dimension().get();
        let mut abstract_matrix = DenseMatrix::with_capacity(dimension, papers.len());
        let chunk_refs: Vec<&str> = all_chunks.iter().map(String::as_str).collect();

        match self.backend.generate_embeddings(&chunk_refs) {
            Ok(rows) => {
                for span in &spans {
                    abstract_matrix.push_row(&average_rows(&rows[span.clone()], dimension))?;
                }
            }
            Err(batch_error) => {
                tracing::warn!(
                    "batch chunk embedding failed, retrying per document: {batch_error}"
                );
                let zero = vec![0.0; dimension];
                for (paper, span) in papers.iter().zip(&spans) {
                    if span.is_empty() {
                        abstract_matrix.push_row(&zero)?;
                        continue;
                    }
                    match self.backend.generate_embeddings(&chunk_refs[span.clone()]) {
                        Ok(rows) => {
                            abstract_matrix.push_row(&average_rows(&rows, dimension))?;
                        }
                        Err(e) => {
                            abstract_matrix.push_row(&zero)?;
                            if !failures.iter().any(|(id, _)| *id == paper.id) {
                                failures.push((paper.id, e.to_string()));
                            }
                        }
                    }
                }
            }
        }

        Ok(EncodedBatch {
            titles: title_matrix,
            abstracts: abstract_matrix,
            failures,
        })
    }

    fn encode_query(&self, query: &str) -> EngineResult<Vec<f32>> {
        let chunks = self.chunk_text(query);
        if chunks.is_empty() {
            return Ok(vec![0.0; self.backend.dimension().get()]);
        }
        let chunk_refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let rows = self
            .backend
            .generate_embeddings(&chunk_refs)
            .map_err(EngineError::from)?;
        if rows.is_empty() {
            return Err(EngineError::EncodingFailed {
                kind: EncoderKind::ChunkedSentence,
                reason: "backend returned no embedding for query".to_string(),
            });
        }
        Ok(average_rows(&rows, self.backend.dimension().get()))
    }
}
