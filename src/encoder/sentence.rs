//! Sentence encoder: one embedding per title and one per abstract.

use super::{EmbeddingGenerator, EncodedBatch, Encoder, EncoderKind, embed_with_fallback};
use crate::error::{EngineError, EngineResult};
use crate::types::{Paper, PaperId, VectorDimension};
use std::sync::Arc;

/// Encodes each title and abstract as a single sentence embedding.
///
/// Abstracts longer than the model's input window are truncated by the
/// backend; use the chunked encoder when the tail matters.
pub struct SentenceEncoder {
    backend: Arc<dyn EmbeddingGenerator>,
}

impl SentenceEncoder {
    #[must_use]
    pub fn new(backend: Arc<dyn EmbeddingGenerator>) -> Self {
        Self { backend }
    }
}

impl Encoder for SentenceEncoder {
    fn kind(&self) -> EncoderKind {
        EncoderKind::Sentence
    }

    fn dimension(&self) -> VectorDimension {
        self.backend.dimension()
    }

    fn encode(&self, papers: &[Paper]) -> EngineResult<EncodedBatch> {
        let ids: Vec<PaperId> = papers.iter().map(|p| p.id).collect();
        let titles: Vec<&str> = papers.iter().map(|p| p.title.as_str()).collect();
        let abstracts: Vec<&str> = papers.iter().map(|p| p.abstract_text.as_str()).collect();

        let (title_matrix, mut failures) =
            embed_with_fallback(self.backend.as_ref(), &ids, &titles)?;
        let (abstract_matrix, abstract_failures) =
            embed_with_fallback(self.backend.as_ref(), &ids, &abstracts)?;

        // A paper that failed on both sides gets one failure entry.
        for (id, reason) in abstract_failures {
            if !failures.iter().any(|(existing, _)| *existing == id) {
                failures.push((id, reason));
            }
        }

        Ok(EncodedBatch {
            titles: title_matrix,
            abstracts: abstract_matrix,
            failures,
        })
    }

    fn encode_query(&self, query: &str) -> EngineResult<Vec<f32>> {
        let mut rows = self
            .backend
            .generate_embeddings(&[query])
            .map_err(EngineError::from)?;
        rows.pop().ok_or_else(|| EngineError::EncodingFailed {
            kind: EncoderKind::Sentence,
            reason: "backend returned no embedding for query".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::MockEmbeddingGenerator;

    fn paper(id: u32, title: &str, abstract_text: &str) -> Paper {
        Paper::new(
            PaperId::new(id).unwrap(),
            format!("10.1000/{id}"),
            title.to_string(),
            abstract_text.to_string(),
        )
    }

    fn encoder() -> SentenceEncoder {
        SentenceEncoder::new(Arc::new(MockEmbeddingGenerator::new()))
    }

    #[test]
    fn test_encode_produces_aligned_rows() {
        let papers = vec![
            paper(1, "Viral replication dynamics", "We study virus spread."),
            paper(2, "Climate feedback loops", "Climate projections over decades."),
        ];

        let batch = encoder().encode(&papers).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.titles.rows(), 2);
        assert_eq!(batch.abstracts.rows(), 2);
        assert_eq!(batch.titles.dimension(), 384);
        assert!(batch.failures.is_empty());
    }

    #[test]
    fn test_encode_empty_batch() {
        let batch = encoder().encode(&[]).unwrap();
        assert!(batch.is_empty());
        assert!(batch.failures.is_empty());
    }

    #[test]
    fn test_encode_query_single_vector() {
        let vector = encoder().encode_query("quantum error correction").unwrap();
        assert_eq!(vector.len(), 384);
    }
}
