//! In-memory embedding matrices over the paper corpus.
//!
//! An [`EmbeddingMatrix`] holds one row per paper in two aligned dense
//! matrices (title and abstract embeddings) plus the id bookkeeping that
//! maps between paper IDs and row indices. The bookkeeping is a bijection:
//! `index_arr[id_map[p]] == p` and `id_map[index_arr[i]] == i` hold at all
//! times, and every named matrix has exactly `index_arr.len()` rows.
//!
//! Growth goes through explicit row appends or the [`MatrixBuilder`]; rows
//! of removed papers are compacted out while preserving the relative order
//! of the survivors.

mod metadata;
mod storage;

pub use metadata::MatrixMetadata;
pub use storage::{ArtifactError, MatrixArtifact};

use crate::types::{MatrixError, PaperId, VectorDimension};
use std::collections::{HashMap, HashSet};

/// A dense row-major f32 matrix with a fixed column count.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    data: Vec<f32>,
    dimension: usize,
}

impl DenseMatrix {
    /// Creates an empty matrix with the given column count.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            data: Vec::new(),
            dimension,
        }
    }

    /// Creates an empty matrix with room for `rows` rows.
    #[must_use]
    pub fn with_capacity(dimension: usize, rows: usize) -> Self {
        Self {
            data: Vec::with_capacity(dimension * rows),
            dimension,
        }
    }

    /// Number of rows currently stored.
    #[must_use]
    pub fn rows(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    /// Column count.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns row `i` as a slice.
    ///
    /// # Panics
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f32] {
        let start = i * self.dimension;
        &self.data[start..start + self.dimension]
    }

    /// Returns row `i` as a mutable slice.
    ///
    /// # Panics
    /// Panics if `i` is out of range.
    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        let start = i * self.dimension;
        &mut self.data[start..start + self.dimension]
    }

    /// Iterates over all rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension)
    }

    /// Appends a row, validating its length.
    pub fn push_row(&mut self, row: &[f32]) -> Result<(), MatrixError> {
        if row.len() != self.dimension {
            return Err(MatrixError::DimensionMismatch {
                expected: self.dimension,
                actual: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    /// Overwrites row `i`, validating its length.
    pub fn set_row(&mut self, i: usize, row: &[f32]) -> Result<(), MatrixError> {
        if row.len() != self.dimension {
            return Err(MatrixError::DimensionMismatch {
                expected: self.dimension,
                actual: row.len(),
            });
        }
        self.row_mut(i).copy_from_slice(row);
        Ok(())
    }

    /// The raw backing slice, row-major.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Builds a new matrix containing only the rows at `indices`, in the
    /// order given.
    #[must_use]
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut out = Self::with_capacity(self.dimension, indices.len());
        for &i in indices {
            out.data.extend_from_slice(self.row(i));
        }
        out
    }
}

/// Whether an upsert appended a fresh row or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Paper was new; a row was appended.
    Appended,
    /// Paper already had a row; it was overwritten in place.
    Replaced,
}

impl UpsertOutcome {
    #[must_use]
    pub fn is_appended(&self) -> bool {
        matches!(self, UpsertOutcome::Appended)
    }
}

/// Aligned title/abstract embedding matrices over the corpus.
///
/// See the module docs for the bijection invariant between `id_map` and
/// `index_arr`.
#[derive(Debug, Clone)]
pub struct EmbeddingMatrix {
    dimension: VectorDimension,
    id_map: HashMap<PaperId, usize>,
    index_arr: Vec<PaperId>,
    titles: DenseMatrix,
    abstracts: DenseMatrix,
}

impl EmbeddingMatrix {
    /// Creates an empty matrix for the given embedding dimension.
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            id_map: HashMap::new(),
            index_arr: Vec::new(),
            titles: DenseMatrix::new(dimension.get()),
            abstracts: DenseMatrix::new(dimension.get()),
        }
    }

    /// Embedding dimension shared by both named matrices.
    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Number of papers (rows).
    #[must_use]
    pub fn len(&self) -> usize {
        self.index_arr.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index_arr.is_empty()
    }

    /// Whether the paper has a row.
    #[must_use]
    pub fn contains(&self, id: PaperId) -> bool {
        self.id_map.contains_key(&id)
    }

    /// Row index for a paper, if present.
    #[must_use]
    pub fn row_of(&self, id: PaperId) -> Option<usize> {
        self.id_map.get(&id).copied()
    }

    /// Paper at a row index, if in range.
    #[must_use]
    pub fn id_at(&self, row: usize) -> Option<PaperId> {
        self.index_arr.get(row).copied()
    }

    /// All paper IDs in row order.
    #[must_use]
    pub fn ids(&self) -> &[PaperId] {
        &self.index_arr
    }

    /// The title embedding matrix.
    #[must_use]
    pub fn titles(&self) -> &DenseMatrix {
        &self.titles
    }

    /// The abstract embedding matrix.
    #[must_use]
    pub fn abstracts(&self) -> &DenseMatrix {
        &self.abstracts
    }

    /// Title embedding row for a paper.
    #[must_use]
    pub fn title_row(&self, id: PaperId) -> Option<&[f32]> {
        self.row_of(id).map(|i| self.titles.row(i))
    }

    /// Abstract embedding row for a paper.
    #[must_use]
    pub fn abstract_row(&self, id: PaperId) -> Option<&[f32]> {
        self.row_of(id).map(|i| self.abstracts.row(i))
    }

    /// Inserts or replaces the rows for a paper.
    ///
    /// New papers append a row to both matrices; known papers overwrite
    /// their existing row in place, keeping the row index stable.
    pub fn upsert(
        &mut self,
        id: PaperId,
        title_row: &[f32],
        abstract_row: &[f32],
    ) -> Result<UpsertOutcome, MatrixError> {
        self.dimension.validate_vector(title_row)?;
        self.dimension.validate_vector(abstract_row)?;

        if let Some(&row) = self.id_map.get(&id) {
            self.titles.set_row(row, title_row)?;
            self.abstracts.set_row(row, abstract_row)?;
            return Ok(UpsertOutcome::Replaced);
        }

        let row = self.index_arr.len();
        self.titles.push_row(title_row)?;
        self.abstracts.push_row(abstract_row)?;
        self.index_arr.push(id);
        self.id_map.insert(id, row);
        Ok(UpsertOutcome::Appended)
    }

    /// Drops every paper not in `keep`, compacting the matrices while
    /// preserving the relative order of the survivors.
    ///
    /// Returns the number of rows removed.
    pub fn retain_ids(&mut self, keep: &HashSet<PaperId>) -> usize {
        let survivors: Vec<usize> = self
            .index_arr
            .iter()
            .enumerate()
            .filter(|(_, id)| keep.contains(id))
            .map(|(i, _)| i)
            .collect();

        if survivors.len() == self.index_arr.len() {
            return 0;
        }

        let removed = self.index_arr.len() - survivors.len();
        self.titles = self.titles.select_rows(&survivors);
        self.abstracts = self.abstracts.select_rows(&survivors);
        self.index_arr = survivors.iter().map(|&i| self.index_arr[i]).collect();
        self.id_map = self
            .index_arr
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();
        removed
    }

    /// Blends title and abstract rows into one matrix:
    /// `title_weight * title + (1 - title_weight) * abstract` per row.
    #[must_use]
    pub fn blended(&self, title_weight: f32) -> DenseMatrix {
        let dim = self.dimension.get();
        let mut out = DenseMatrix::with_capacity(dim, self.len());
        let abstract_weight = 1.0 - title_weight;
        for i in 0..self.len() {
            let title = self.titles.row(i);
            let abs = self.abstracts.row(i);
            let row: Vec<f32> = title
                .iter()
                .zip(abs.iter())
                .map(|(t, a)| title_weight * t + abstract_weight * a)
                .collect();
            out.data.extend_from_slice(&row);
        }
        out
    }

    /// Verifies the id bookkeeping and row counts.
    ///
    /// Called after loading an artifact from disk; a violation means the
    /// artifact is corrupted.
    pub fn check_consistency(&self) -> Result<(), MatrixError> {
        let rows = self.index_arr.len();
        if self.id_map.len() != rows {
            return Err(MatrixError::Serialization(format!(
                "id_map has {} entries but index_arr has {} rows",
                self.id_map.len(),
                rows
            )));
        }
        if self.titles.rows() != rows || self.abstracts.rows() != rows {
            return Err(MatrixError::Serialization(format!(
                "matrix rows disagree: {} ids, {} title rows, {} abstract rows",
                rows,
                self.titles.rows(),
                self.abstracts.rows()
            )));
        }
        for (i, id) in self.index_arr.iter().enumerate() {
            match self.id_map.get(id) {
                Some(&mapped) if mapped == i => {}
                _ => {
                    return Err(MatrixError::Serialization(format!(
                        "id bookkeeping broken at row {i} (paper {id})"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Builds an [`EmbeddingMatrix`] row by row with pre-allocated capacity.
///
/// The builder is the only growth path for bulk construction; it allocates
/// once and copies rows in, so a half-built matrix is never observable.
#[derive(Debug)]
pub struct MatrixBuilder {
    matrix: EmbeddingMatrix,
}

impl MatrixBuilder {
    /// Creates a builder for the given dimension.
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            matrix: EmbeddingMatrix::new(dimension),
        }
    }

    /// Creates a builder with capacity for `rows` papers.
    #[must_use]
    pub fn with_capacity(dimension: VectorDimension, rows: usize) -> Self {
        let mut matrix = EmbeddingMatrix::new(dimension);
        matrix.titles = DenseMatrix::with_capacity(dimension.get(), rows);
        matrix.abstracts = DenseMatrix::with_capacity(dimension.get(), rows);
        matrix.index_arr = Vec::with_capacity(rows);
        matrix.id_map = HashMap::with_capacity(rows);
        Self { matrix }
    }

    /// Appends rows for a paper.
    ///
    /// Returns an error on a duplicate paper ID or a dimension mismatch.
    pub fn push(
        &mut self,
        id: PaperId,
        title_row: &[f32],
        abstract_row: &[f32],
    ) -> Result<(), MatrixError> {
        if self.matrix.contains(id) {
            return Err(MatrixError::Serialization(format!(
                "duplicate paper ID {id} while building matrix"
            )));
        }
        self.matrix.upsert(id, title_row, abstract_row)?;
        Ok(())
    }

    /// Number of rows pushed so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matrix.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    /// Finishes the build.
    #[must_use]
    pub fn finish(self) -> EmbeddingMatrix {
        self.matrix
    }
}
