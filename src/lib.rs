//! Semantic search and topic discovery over an academic paper corpus.
//!
//! The library embeds paper titles and abstracts into per-encoder matrix
//! artifacts, answers queries through a staged search pipeline, finds
//! papers similar to a given paper, and partitions the corpus into named
//! topics. [`PaperEngine`] is the entry point; the `paperlens` binary
//! wraps it in a CLI.

pub mod cache;
pub mod config;
pub mod corpus;
pub mod display;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod io;
pub mod matrix;
pub mod search;
pub mod similarity;
pub mod topics;
pub mod types;

// Explicit exports for better API clarity
pub use cache::{DirRemoteStore, EmbeddingCache, RemoteStore, SyncClient, SyncReport, UpdateStats};
pub use config::Settings;
pub use corpus::{Corpus, InMemoryCorpus};
pub use encoder::{Encoder, EncoderKind, EncoderRegistry};
pub use engine::{EncoderStatus, EngineStatus, PaperEngine};
pub use error::{EngineError, EngineResult, ErrorContext};
pub use matrix::{DenseMatrix, EmbeddingMatrix};
pub use search::{SearchContext, SearchPipeline, SearchStage, StageOutcome};
pub use similarity::{SimilarityMetric, metric_for};
pub use topics::{AssignStats, ReclusterStats, Topic, TopicEngine};
pub use types::{Author, MatrixError, Paper, PaperId, Score, SearchHit, TopicId, VectorDimension};
