//! Shared fixtures for the scenario tests.
//!
//! Provides a deterministic embedding backend and small corpora with
//! clearly separated themes, so ranking and clustering outcomes are
//! predictable without downloading a model.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use paperlens::encoder::EmbeddingGenerator;
use paperlens::{
    Author, EncoderRegistry, InMemoryCorpus, MatrixError, Paper, PaperEngine, PaperId, Settings,
    VectorDimension,
};

/// Theme words and the pair of dimensions each one lights up.
const THEMES: &[(&str, usize, [f32; 2])] = &[
    ("virus", 0, [0.9, 0.8]),
    ("viral", 0, [0.9, 0.8]),
    ("climate", 2, [0.85, 0.75]),
    ("quantum", 4, [0.9, 0.85]),
    ("cat", 6, [0.9, 0.8]),
    ("dog", 8, [0.9, 0.8]),
    ("space", 10, [0.85, 0.8]),
];

/// Deterministic stand-in for the fastembed backend.
///
/// Texts sharing a theme embed to identical unit vectors; texts from
/// different themes land around 0.8 cosine similarity, far enough apart
/// for ranking and clustering to separate them.
pub struct KeywordEmbedder;

impl EmbeddingGenerator for KeywordEmbedder {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, MatrixError> {
        let dim = self.dimension().get();
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let mut vector = vec![0.1_f32; dim];
                for (word, start, boost) in THEMES {
                    if lower.contains(word) {
                        vector[*start] = boost[0];
                        vector[start + 1] = boost[1];
                    }
                }
                let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
                for value in &mut vector {
                    *value /= norm;
                }
                vector
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        VectorDimension::dimension_384()
    }
}

pub fn pid(id: u32) -> PaperId {
    PaperId::new(id).expect("paper ids start at 1")
}

/// Default settings rooted in an isolated workspace directory.
pub fn workspace_settings(dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.workspace_root = Some(dir.to_path_buf());
    settings
}

/// Opens an engine over the corpus with the deterministic backend.
pub fn open_engine(corpus: Arc<InMemoryCorpus>, dir: &Path) -> PaperEngine {
    open_engine_with(corpus, workspace_settings(dir))
}

pub fn open_engine_with(corpus: Arc<InMemoryCorpus>, settings: Settings) -> PaperEngine {
    let registry = Arc::new(EncoderRegistry::with_backend(
        settings,
        Arc::new(KeywordEmbedder),
    ));
    PaperEngine::with_registry(registry, corpus).expect("engine should open")
}

/// Six papers over three research themes, papers 1 and 2 by one author.
pub fn themed_corpus() -> InMemoryCorpus {
    let corpus = InMemoryCorpus::new();
    corpus.insert(Paper::new(
        pid(1),
        "10.1/v1",
        "Coronavirus transmission dynamics",
        "We model viral spread in cities.",
    ));
    corpus.insert(Paper::new(
        pid(2),
        "10.1/v2",
        "Viral load kinetics",
        "Virus replication over time.",
    ));
    corpus.insert(Paper::new(
        pid(3),
        "10.1/c1",
        "Climate feedback loops",
        "Climate projections under forcing.",
    ));
    corpus.insert(Paper::new(
        pid(4),
        "10.1/c2",
        "Regional climate shifts",
        "Climate records from ice cores.",
    ));
    corpus.insert(Paper::new(
        pid(5),
        "10.1/q1",
        "Quantum error correction",
        "Quantum codes for noisy channels.",
    ));
    corpus.insert(Paper::new(
        pid(6),
        "10.1/q2",
        "Quantum annealing hardware",
        "Quantum optimization devices.",
    ));
    corpus.set_authors(vec![Author {
        first_name: "Mara".to_string(),
        last_name: "Keller".to_string(),
        paper_ids: vec![pid(1), pid(2)],
    }]);
    corpus
}

/// Three obviously separable groups for clustering tests.
pub fn pet_corpus() -> InMemoryCorpus {
    let corpus = InMemoryCorpus::new();
    corpus.insert(Paper::new(
        pid(1),
        "10.2/cat1",
        "Cat grooming rituals",
        "How a cat cleans its fur.",
    ));
    corpus.insert(Paper::new(
        pid(2),
        "10.2/cat2",
        "Cat territorial behavior",
        "A cat marks and defends territory.",
    ));
    corpus.insert(Paper::new(
        pid(3),
        "10.2/dog1",
        "Dog training methods",
        "Reward schedules for dog obedience.",
    ));
    corpus.insert(Paper::new(
        pid(4),
        "10.2/dog2",
        "Dog pack hierarchy",
        "Rank formation in dog groups.",
    ));
    corpus.insert(Paper::new(
        pid(5),
        "10.2/sp1",
        "Space telescope imaging",
        "Deep field exposures from space.",
    ));
    corpus.insert(Paper::new(
        pid(6),
        "10.2/sp2",
        "Space probe navigation",
        "Course corrections in deep space.",
    ));
    corpus
}
