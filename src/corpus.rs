//! Corpus collaborator: where papers and authors come from.
//!
//! The engine never owns paper storage; it talks to a [`Corpus`]
//! implementation. [`InMemoryCorpus`] ships in-tree for tests, demos, and
//! single-host deployments that load a JSON snapshot.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::types::{Author, Paper, PaperId};

/// Source of papers and authors for the engine.
///
/// `papers()` returns a snapshot sorted by paper ID so that batch
/// operations iterate in a stable order.
pub trait Corpus: Send + Sync {
    /// All papers, sorted by ID.
    fn papers(&self) -> Vec<Paper>;

    /// A single paper by ID.
    fn paper(&self, id: PaperId) -> Option<Paper>;

    /// Papers for the given IDs; unknown IDs are skipped.
    fn papers_by_ids(&self, ids: &[PaperId]) -> Vec<Paper> {
        ids.iter().filter_map(|id| self.paper(*id)).collect()
    }

    /// Papers matching a DOI exactly.
    fn papers_by_doi(&self, doi: &str) -> Vec<PaperId>;

    /// All known authors with their paper links.
    fn authors(&self) -> Vec<Author>;

    /// Flips the `vectorized` flag to true for the given papers.
    ///
    /// Called after their embeddings have been persisted.
    fn mark_vectorized(&self, ids: &[PaperId]);

    /// Number of papers in the corpus.
    fn paper_count(&self) -> usize {
        self.papers().len()
    }
}

/// Serialized corpus snapshot: the JSON shape `load_json` reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    pub papers: Vec<Paper>,
    #[serde(default)]
    pub authors: Vec<Author>,
}

/// Thread-safe in-memory corpus.
#[derive(Debug, Default)]
pub struct InMemoryCorpus {
    papers: RwLock<HashMap<PaperId, Paper>>,
    authors: RwLock<Vec<Author>>,
}

impl InMemoryCorpus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a corpus from papers, with no author records.
    #[must_use]
    pub fn from_papers(papers: impl IntoIterator<Item = Paper>) -> Self {
        let corpus = Self::new();
        for paper in papers {
            corpus.insert(paper);
        }
        corpus
    }

    /// Loads a JSON snapshot (see [`CorpusSnapshot`]).
    pub fn load_json(path: &Path) -> EngineResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| EngineError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: CorpusSnapshot =
            serde_json::from_str(&json).map_err(|e| EngineError::General(format!(
                "Corpus file '{}' is not valid JSON: {e}",
                path.display()
            )))?;

        let corpus = Self::new();
        for paper in snapshot.papers {
            corpus.insert(paper);
        }
        *corpus.authors.write() = snapshot.authors;
        Ok(corpus)
    }

    /// Inserts or replaces a paper. A replaced paper is marked stale.
    pub fn insert(&self, mut paper: Paper) {
        paper.vectorized = false;
        self.papers.write().insert(paper.id, paper);
    }

    /// Removes a paper, returning whether it existed.
    pub fn remove(&self, id: PaperId) -> bool {
        self.papers.write().remove(&id).is_some()
    }

    /// Marks a paper stale without changing its text.
    pub fn touch(&self, id: PaperId) {
        if let Some(paper) = self.papers.write().get_mut(&id) {
            paper.vectorized = false;
        }
    }

    /// Replaces the author list.
    pub fn set_authors(&self, authors: Vec<Author>) {
        *self.authors.write() = authors;
    }
}

impl Corpus for InMemoryCorpus {
    fn papers(&self) -> Vec<Paper> {
        let mut papers: Vec<Paper> = self.papers.read().values().cloned().collect();
        papers.sort_by_key(|p| p.id);
        papers
    }

    fn paper(&self, id: PaperId) -> Option<Paper> {
        self.papers.read().get(&id).cloned()
    }

    fn papers_by_doi(&self, doi: &str) -> Vec<PaperId> {
        let mut ids: Vec<PaperId> = self
            .papers
            .read()
            .values()
            .filter(|p| p.doi == doi)
            .map(|p| p.id)
            .collect();
        ids.sort();
        ids
    }

    fn authors(&self) -> Vec<Author> {
        self.authors.read().clone()
    }

    fn mark_vectorized(&self, ids: &[PaperId]) {
        let mut papers = self.papers.write();
        for id in ids {
            if let Some(paper) = papers.get_mut(id) {
                paper.vectorized = true;
            }
        }
    }

    fn paper_count(&self) -> usize {
        self.papers.read().len()
    }
}
