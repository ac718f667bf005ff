//! K-means clustering over blended paper vectors.
//!
//! Pure Rust k-means seeded with k-means++ and run under Lloyd's
//! algorithm. Distance is cosine, not Euclidean, matching how the
//! rest of the engine compares embeddings. Cluster labels index into
//! the centroid list.

use rand::Rng;
use rayon::prelude::*;
use thiserror::Error;

use crate::matrix::DenseMatrix;

/// Maximum number of Lloyd iterations.
const MAX_ITERATIONS: usize = 100;

/// Convergence tolerance for centroid movement between iterations.
const CONVERGENCE_TOLERANCE: f32 = 1e-4;

/// Threshold below which a norm or distance counts as zero.
const EPSILON: f32 = 1e-10;

/// Result of a k-means run.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Cluster centroids, unit length, same dimension as the input rows.
    pub centroids: Vec<Vec<f32>>,

    /// Cluster label per input row, `0..centroids.len()`.
    pub assignments: Vec<usize>,

    /// Iterations until convergence.
    pub iterations: usize,
}

/// Errors from clustering operations.
#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error(
        "Empty matrix provided for clustering\nSuggestion: Run an embedding update before clustering"
    )]
    EmptyMatrix,

    #[error("Invalid cluster count: {0}\nSuggestion: Use k between 1 and the number of papers")]
    InvalidClusterCount(usize),

    #[error(
        "Failed to initialize centroids\nSuggestion: Check that the embedding matrix contains valid floating-point values"
    )]
    InitializationFailed,
}

/// Clusters the rows of `matrix` into `k` groups by cosine similarity.
///
/// 1. Seed centroids with k-means++.
/// 2. Iterate until convergence or the iteration cap:
///    - assign each row to its most similar centroid,
///    - recompute centroids as the normalized mean of their rows,
///    - stop when assignments are stable or centroids barely move.
///
/// Empty clusters are reseeded from a random row.
#[must_use = "clustering results should be used or the computation is wasted"]
pub fn kmeans_clustering(matrix: &DenseMatrix, k: usize) -> Result<KMeansResult, ClusteringError> {
    if matrix.is_empty() {
        return Err(ClusteringError::EmptyMatrix);
    }
    if k == 0 || k > matrix.rows() {
        return Err(ClusteringError::InvalidClusterCount(k));
    }

    let mut centroids = initialize_centroids_kmeans_plus_plus(matrix, k)?;
    let mut assignments = vec![0usize; matrix.rows()];
    let mut iterations = 0;

    loop {
        iterations += 1;

        let new_assignments: Vec<usize> = (0..matrix.rows())
            .into_par_iter()
            .map(|row| assign_to_nearest_centroid(matrix.row(row), &centroids))
            .collect();

        let converged = new_assignments == assignments;
        assignments = new_assignments;

        if converged || iterations >= MAX_ITERATIONS {
            break;
        }

        let new_centroids = update_centroids(matrix, &assignments, k);
        let centroid_movement = calculate_centroid_movement(&centroids, &new_centroids);
        centroids = new_centroids;

        if centroid_movement < CONVERGENCE_TOLERANCE {
            break;
        }
    }

    if iterations >= MAX_ITERATIONS {
        // Unconverged results are still usable, just noisier.
        tracing::warn!(iterations, "k-means hit the iteration cap without converging");
    }

    Ok(KMeansResult {
        centroids,
        assignments,
        iterations,
    })
}

/// Label of the centroid most cosine-similar to `vector`.
fn assign_to_nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best_similarity = f32::NEG_INFINITY;
    let mut best_cluster = 0;

    for (label, centroid) in centroids.iter().enumerate() {
        let similarity = cosine_similarity(vector, centroid);
        if similarity > best_similarity {
            best_similarity = similarity;
            best_cluster = label;
        }
    }
    best_cluster
}

/// Recomputes centroids as the normalized mean of their assigned rows.
fn update_centroids(matrix: &DenseMatrix, assignments: &[usize], k: usize) -> Vec<Vec<f32>> {
    let dimension = matrix.dimension();
    let mut new_centroids = vec![vec![0.0; dimension]; k];
    let mut cluster_sizes = vec![0usize; k];

    for (row, &label) in assignments.iter().enumerate() {
        for (i, &value) in matrix.row(row).iter().enumerate() {
            new_centroids[label][i] += value;
        }
        cluster_sizes[label] += 1;
    }

    for (centroid, &size) in new_centroids.iter_mut().zip(cluster_sizes.iter()) {
        if size == 0 {
            // Empty cluster: reseed from a random row.
            let random_row = rand::rng().random_range(0..matrix.rows());
            *centroid = normalize_vector_copy(matrix.row(random_row));
        } else {
            for value in centroid.iter_mut() {
                *value /= size as f32;
            }
            normalize_vector(centroid);
        }
    }

    new_centroids
}

/// Cosine similarity in `[-1, 1]`; zero vectors score 0.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have the same dimension");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// K-means++ seeding: later centroids are drawn with probability
/// proportional to their squared cosine distance from the nearest
/// already-chosen centroid.
fn initialize_centroids_kmeans_plus_plus(
    matrix: &DenseMatrix,
    k: usize,
) -> Result<Vec<Vec<f32>>, ClusteringError> {
    let mut rng = rand::rng();
    let mut centroids = Vec::with_capacity(k);

    let first_row = rng.random_range(0..matrix.rows());
    centroids.push(normalize_vector_copy(matrix.row(first_row)));

    for _ in 1..k {
        let mut distances = vec![0.0f32; matrix.rows()];
        let mut total_distance = 0.0f32;

        for (i, vector) in matrix.iter_rows().enumerate() {
            let mut min_distance = f32::MAX;
            for centroid in &centroids {
                let distance = 1.0 - cosine_similarity(vector, centroid);
                min_distance = min_distance.min(distance);
            }
            distances[i] = min_distance * min_distance;
            total_distance += distances[i];
        }

        if total_distance < EPSILON {
            // Every row coincides with an existing centroid.
            break;
        }

        let mut cumulative = 0.0;
        let target = rng.random::<f32>() * total_distance;
        let mut added = false;

        for (i, &distance) in distances.iter().enumerate() {
            cumulative += distance;
            if cumulative >= target {
                centroids.push(normalize_vector_copy(matrix.row(i)));
                added = true;
                break;
            }
        }

        // Rounding errors can leave the target unreached.
        if !added && centroids.len() < k {
            centroids.push(normalize_vector_copy(matrix.row(matrix.rows() - 1)));
        }
    }

    if centroids.len() != k {
        return Err(ClusteringError::InitializationFailed);
    }

    Ok(centroids)
}

/// Mean cosine distance between old and new centroid positions.
fn calculate_centroid_movement(old: &[Vec<f32>], new: &[Vec<f32>]) -> f32 {
    old.iter()
        .zip(new.iter())
        .map(|(old_c, new_c)| 1.0 - cosine_similarity(old_c, new_c))
        .sum::<f32>()
        / old.len() as f32
}

fn normalize_vector(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

fn normalize_vector_copy(vector: &[f32]) -> Vec<f32> {
    let mut normalized = vector.to_vec();
    normalize_vector(&mut normalized);
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_from(rows: &[Vec<f32>]) -> DenseMatrix {
        let mut matrix = DenseMatrix::new(rows[0].len());
        for row in rows {
            matrix.push_row(row).unwrap();
        }
        matrix
    }

    #[test]
    fn test_cosine_similarity() {
        let v = vec![0.5, 1.5, 2.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < f32::EPSILON);

        let orthogonal = (vec![2.0, 0.0], vec![0.0, 7.0]);
        assert!(cosine_similarity(&orthogonal.0, &orthogonal.1).abs() < f32::EPSILON);

        let negated: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &negated) + 1.0).abs() < f32::EPSILON);

        assert_eq!(cosine_similarity(&v, &[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_three_axis_aligned_clusters() {
        // Three tight groups, one per axis, with mild noise.
        let matrix = matrix_from(&[
            vec![0.95, 0.15, 0.05],
            vec![1.05, 0.05, 0.15],
            vec![0.85, 0.10, 0.10],
            vec![0.15, 0.95, 0.05],
            vec![0.05, 1.05, 0.15],
            vec![0.10, 0.85, 0.10],
            vec![0.15, 0.05, 0.95],
            vec![0.05, 0.15, 1.05],
            vec![0.10, 0.10, 0.85],
        ]);

        let result = kmeans_clustering(&matrix, 3).unwrap();

        assert_eq!(result.centroids.len(), 3);
        assert_eq!(result.assignments.len(), 9);
        assert!(result.iterations <= MAX_ITERATIONS);

        for group in [[0, 1, 2], [3, 4, 5], [6, 7, 8]] {
            let label = result.assignments[group[0]];
            for &row in &group {
                assert_eq!(result.assignments[row], label, "row {row} left its group");
            }
        }
    }

    #[test]
    fn test_invalid_inputs() {
        let empty = DenseMatrix::new(2);
        assert!(matches!(
            kmeans_clustering(&empty, 1),
            Err(ClusteringError::EmptyMatrix)
        ));

        let one_row = matrix_from(&[vec![0.3, 0.7]]);
        assert!(matches!(
            kmeans_clustering(&one_row, 0),
            Err(ClusteringError::InvalidClusterCount(0))
        ));

        let two_rows = matrix_from(&[vec![0.3, 0.7], vec![0.6, 0.4]]);
        assert!(matches!(
            kmeans_clustering(&two_rows, 3),
            Err(ClusteringError::InvalidClusterCount(3))
        ));
    }

    #[test]
    fn test_single_cluster_takes_everything() {
        let matrix = matrix_from(&[
            vec![0.2, 0.4, 0.6],
            vec![0.5, 0.7, 0.9],
            vec![0.8, 0.1, 0.3],
        ]);

        let result = kmeans_clustering(&matrix, 1).unwrap();

        assert_eq!(result.centroids.len(), 1);
        assert!(result.assignments.iter().all(|&label| label == 0));
    }

    #[test]
    fn test_k_equals_row_count() {
        let matrix = matrix_from(&[vec![1.0, 0.0], vec![0.0, 1.0]]);

        let result = kmeans_clustering(&matrix, 2).unwrap();

        let mut labels = result.assignments.clone();
        labels.sort_unstable();
        assert_eq!(labels, vec![0, 1]);
    }
}
