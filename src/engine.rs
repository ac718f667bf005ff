//! The engine facade.
//!
//! [`PaperEngine`] wires a [`Corpus`] to the encoder registry, the
//! embedding cache, the search pipeline, and the topic engine, and is the
//! one object library callers and the CLI hold. Every operation checks
//! artifact freshness before reading, so a long-lived engine picks up
//! updates written by another process.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cache::{EmbeddingCache, RemoteStore, SyncClient, SyncReport, UpdateStats};
use crate::config::Settings;
use crate::corpus::Corpus;
use crate::encoder::{EncoderKind, EncoderRegistry};
use crate::error::{EngineError, EngineResult};
use crate::search::{SearchContext, SearchPipeline};
use crate::similarity::metric_for;
use crate::topics::{AssignStats, ReclusterStats, Topic, TopicEngine};
use crate::types::{PaperId, Score, SearchHit, TopicId};

/// Readiness of one encoder kind.
#[derive(Debug, Clone)]
pub struct EncoderStatus {
    pub kind: EncoderKind,
    pub ready: bool,
}

/// Snapshot of engine state for the status probe.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    /// The encoder kind the cache is bound to.
    pub default_kind: EncoderKind,
    pub encoders: Vec<EncoderStatus>,
    /// Whether an eager encoder initialization is in flight.
    pub initializing: bool,
    /// Papers in the corpus.
    pub papers: usize,
    /// Papers with a persisted embedding row.
    pub embedded: usize,
    pub topics: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub artifact_path: PathBuf,
}

/// Ties the corpus, encoders, cache, search, and topics together.
pub struct PaperEngine {
    settings: Settings,
    corpus: Arc<dyn Corpus>,
    registry: Arc<EncoderRegistry>,
    cache: EmbeddingCache,
    topics: TopicEngine,
    pipeline: SearchPipeline,
}

impl PaperEngine {
    /// Opens the engine with the configured default encoder.
    ///
    /// Constructing the encoder loads the embedding backend, so the first
    /// call on a fresh machine downloads the model.
    pub fn open(settings: Settings, corpus: Arc<dyn Corpus>) -> EngineResult<Self> {
        Self::with_registry(Arc::new(EncoderRegistry::new(settings)), corpus)
    }

    /// Opens the engine against a pre-built encoder registry.
    pub fn with_registry(
        registry: Arc<EncoderRegistry>,
        corpus: Arc<dyn Corpus>,
    ) -> EngineResult<Self> {
        let settings = registry.settings().clone();
        let kind = registry.default_kind()?;
        let encoder = registry.create(kind)?;
        let cache = EmbeddingCache::open(&settings, encoder)?;
        let topics = TopicEngine::load(&settings)?;
        Ok(Self {
            settings,
            corpus,
            registry,
            cache,
            topics,
            pipeline: SearchPipeline::standard(),
        })
    }

    /// Brings the embedding artifact in line with the corpus.
    ///
    /// With `force`, every paper is re-encoded whether or not it changed.
    pub fn update(&self, force: bool) -> EngineResult<UpdateStats> {
        self.cache.update(self.corpus.as_ref(), force)
    }

    /// Runs a query through the search pipeline, best hit first.
    pub fn search(&self, query: &str) -> EngineResult<Vec<SearchHit>> {
        self.cache.reload_if_stale()?;
        let ctx = SearchContext::new(
            self.corpus.as_ref(),
            &self.cache,
            self.settings.search.score_min,
        );
        self.pipeline.search(query, &ctx)
    }

    /// Papers most similar to an already embedded paper, best first.
    ///
    /// Every title vector is scored against the query paper's abstract
    /// vector and every abstract vector against its title vector, the two
    /// blended by title importance. The paper itself never appears in the
    /// result. A bounded min-heap keeps the selection at `top` candidates.
    pub fn similar(&self, id: PaperId, top: usize) -> EngineResult<Vec<SearchHit>> {
        self.cache.reload_if_stale()?;
        let matrix = self.cache.matrix();
        let row = matrix
            .row_of(id)
            .ok_or(EngineError::PaperNotIndexed { id })?;

        let metric = metric_for(self.cache.kind());
        let title_scores = metric.scores(matrix.abstracts().row(row), matrix.titles());
        let abstract_scores = metric.scores(matrix.titles().row(row), matrix.abstracts());
        let title_importance = self.cache.title_importance();

        // Min-heap over (score, descending id): the evicted element is
        // always the lowest-scored candidate, largest id on ties.
        let mut heap: BinaryHeap<Reverse<(Score, Reverse<PaperId>)>> =
            BinaryHeap::with_capacity(top + 1);
        for (other, &paper) in matrix.ids().iter().enumerate() {
            if other == row {
                continue;
            }
            let blended = title_importance * title_scores[other].get()
                + (1.0 - title_importance) * abstract_scores[other].get();
            heap.push(Reverse((Score::saturating(blended), Reverse(paper))));
            if heap.len() > top {
                heap.pop();
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse((score, Reverse(paper)))| SearchHit::new(paper, score.get()))
            .collect())
    }

    /// Rebuilds the topic partition; `k` falls back to the configured
    /// cluster count.
    pub fn recluster(&self, k: Option<usize>) -> EngineResult<ReclusterStats> {
        self.cache.reload_if_stale()?;
        let k = k.unwrap_or(self.settings.topics.cluster_count);
        self.topics.recluster(self.corpus.as_ref(), &self.cache, k)
    }

    /// Places newly embedded papers into the existing topics.
    pub fn assign_new(&self) -> EngineResult<AssignStats> {
        self.cache.reload_if_stale()?;
        self.topics.assign_new(&self.cache)
    }

    /// Current topics; empty before the first reclustering.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        self.topics.topics()
    }

    /// The topic a paper belongs to, if any.
    #[must_use]
    pub fn topic_of(&self, id: PaperId) -> Option<TopicId> {
        self.topics.topic_of(id)
    }

    /// Downloads artifacts the remote holds newer copies of, then reloads
    /// the cache if anything arrived.
    pub fn pull(&self, store: &dyn RemoteStore) -> EngineResult<SyncReport> {
        let report = SyncClient::new(store, &self.settings).pull(&[self.cache.kind()])?;
        if !report.is_noop() {
            self.cache.reload_if_stale()?;
        }
        Ok(report)
    }

    /// Uploads artifacts that are newer locally than on the remote.
    pub fn push(&self, store: &dyn RemoteStore) -> EngineResult<SyncReport> {
        SyncClient::new(store, &self.settings).push(&[self.cache.kind()])
    }

    /// Snapshot of engine and encoder state.
    pub fn status(&self) -> EngineResult<EngineStatus> {
        let encoders = EncoderKind::ALL
            .iter()
            .map(|&kind| EncoderStatus {
                kind,
                ready: self.registry.is_ready(kind),
            })
            .collect();
        Ok(EngineStatus {
            default_kind: self.cache.kind(),
            encoders,
            initializing: self.registry.is_initializing(),
            papers: self.corpus.paper_count(),
            embedded: self.cache.len(),
            topics: self.topics.topic_count(),
            last_updated: self.cache.last_updated()?,
            artifact_path: self.cache.artifact_path().to_path_buf(),
        })
    }

    /// The live settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The embedding cache backing search and topics.
    #[must_use]
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}
