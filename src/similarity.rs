//! Similarity metrics between a query vector and matrix rows.
//!
//! Every metric maps into [0.0, 1.0] through the [`Score`] wrapper:
//!
//! - [`CosineSimilarity`]: `(2 - cosine_distance) / 2`, i.e. `(1 + cos) / 2`
//! - [`JensenShannonSimilarity`]: `1 - js_divergence` (base 2) over
//!   probability distributions
//! - [`EuclideanSimilarity`]: `1 - euclidean_distance`, clamped, intended
//!   for unit-norm embeddings
//!
//! Scoring an empty matrix returns an empty vector and is not an error.

use rayon::prelude::*;

use crate::encoder::EncoderKind;
use crate::matrix::DenseMatrix;
use crate::types::Score;

/// Guard against division by zero in norm and distribution handling.
const EPSILON: f32 = 1e-10;

/// A similarity metric over embedding vectors.
pub trait SimilarityMetric: Send + Sync {
    /// Short name used in logs and configuration.
    fn name(&self) -> &'static str;

    /// Similarity between two vectors.
    fn pair(&self, a: &[f32], b: &[f32]) -> Score;

    /// Similarity between a query and every matrix row, one score per row.
    fn scores(&self, query: &[f32], matrix: &DenseMatrix) -> Vec<Score> {
        (0..matrix.rows())
            .into_par_iter()
            .map(|i| self.pair(query, matrix.row(i)))
            .collect()
    }
}

/// Cosine similarity mapped into [0, 1].
///
/// Zero-norm vectors are treated as having cosine 0, scoring 0.5.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineSimilarity;

impl SimilarityMetric for CosineSimilarity {
    fn name(&self) -> &'static str {
        "cosine"
    }

    fn pair(&self, a: &[f32], b: &[f32]) -> Score {
        let cos = cosine(a, b);
        Score::saturating((1.0 + cos) / 2.0)
    }
}

/// Jensen-Shannon similarity over probability distributions.
///
/// Rows that do not sum to 1 are renormalized before the divergence is
/// taken; all-zero rows (and an all-zero query) score 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct JensenShannonSimilarity;

impl SimilarityMetric for JensenShannonSimilarity {
    fn name(&self) -> &'static str {
        "jensen-shannon"
    }

    fn pair(&self, a: &[f32], b: &[f32]) -> Score {
        let p = match normalize_distribution(a) {
            Some(p) => p,
            None => return Score::zero(),
        };
        let q = match normalize_distribution(b) {
            Some(q) => q,
            None => return Score::zero(),
        };
        Score::saturating(1.0 - js_divergence(&p, &q))
    }
}

/// Euclidean similarity: `1 - distance`, clamped into [0, 1].
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanSimilarity;

impl SimilarityMetric for EuclideanSimilarity {
    fn name(&self) -> &'static str {
        "euclidean"
    }

    fn pair(&self, a: &[f32], b: &[f32]) -> Score {
        let dist: f32 = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt();
        Score::saturating(1.0 - dist)
    }
}

/// The metric matching an encoder's vector space: topic distributions
/// compare by Jensen-Shannon, sentence embeddings by cosine.
#[must_use]
pub fn metric_for(kind: EncoderKind) -> Box<dyn SimilarityMetric> {
    match kind {
        EncoderKind::TopicModel => Box::new(JensenShannonSimilarity),
        EncoderKind::Sentence | EncoderKind::ChunkedSentence => Box::new(CosineSimilarity),
    }
}

/// Raw cosine of the angle between two vectors, 0 when either has zero norm.
#[must_use]
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Renormalizes a vector into a probability distribution.
///
/// Returns `None` for vectors with a non-positive sum (including the
/// all-zero failure rows the encoder emits).
fn normalize_distribution(v: &[f32]) -> Option<Vec<f32>> {
    let sum: f32 = v.iter().filter(|x| **x > 0.0).sum();
    if sum < EPSILON {
        return None;
    }
    Some(v.iter().map(|x| x.max(0.0) / sum).collect())
}

/// Base-2 Jensen-Shannon divergence between two distributions, in [0, 1].
fn js_divergence(p: &[f32], q: &[f32]) -> f32 {
    let mut kl_pm = 0.0;
    let mut kl_qm = 0.0;
    for (&pi, &qi) in p.iter().zip(q.iter()) {
        let mi = 0.5 * (pi + qi);
        if mi < EPSILON {
            continue;
        }
        if pi > EPSILON {
            kl_pm += pi * (pi / mi).log2();
        }
        if qi > EPSILON {
            kl_qm += qi * (qi / mi).log2();
        }
    }
    0.5 * kl_pm + 0.5 * kl_qm
}
