//! Multi-stage paper search.
//!
//! A query passes through an ordered list of stages. Cheap, precise
//! stages (DOI lookup, near-exact title) run before broad ones (keyword,
//! semantic). Each stage reports scored papers and may rewrite the query
//! for the stages after it, e.g. stripping a recognized author name so it
//! is not re-scored as a keyword miss. Stage scores are combined into a
//! weighted mean over the stages that contributed at least one
//! qualifying result.

mod stages;
mod stopwords;
mod trigram;

pub use stages::{AuthorStage, DoiStage, ExactTitleStage, KeywordStage, SemanticStage};
pub use stopwords::{STOP_WORDS, content_words, is_stop_word};
pub use trigram::trigram_similarity;

use std::collections::HashMap;

use crate::cache::EmbeddingCache;
use crate::corpus::Corpus;
use crate::error::EngineResult;
use crate::types::{PaperId, SearchHit};

/// Lookup state shared by every stage of one search.
pub struct SearchContext<'a> {
    pub corpus: &'a dyn Corpus,
    pub cache: &'a EmbeddingCache,
    /// Threshold a stage score must exceed to count toward the result.
    pub score_min: f32,
}

impl<'a> SearchContext<'a> {
    #[must_use]
    pub fn new(corpus: &'a dyn Corpus, cache: &'a EmbeddingCache, score_min: f32) -> Self {
        Self {
            corpus,
            cache,
            score_min,
        }
    }
}

/// What one stage found, plus its instructions for the rest of the
/// pipeline. Termination is an explicit value here rather than control
/// flow inside the stage.
#[derive(Debug)]
pub struct StageOutcome {
    /// Scored papers. Entries at or below `score_min` are ignored.
    pub matches: Vec<(PaperId, f32)>,
    /// Replacement query for the stages after this one.
    pub rewritten_query: Option<String>,
    /// When false, no later stage runs.
    pub should_continue: bool,
}

impl StageOutcome {
    /// Nothing found, pipeline continues unchanged.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            matches: Vec::new(),
            rewritten_query: None,
            should_continue: true,
        }
    }

    #[must_use]
    pub fn with_matches(matches: Vec<(PaperId, f32)>) -> Self {
        Self {
            matches,
            rewritten_query: None,
            should_continue: true,
        }
    }

    /// Hands later stages a rewritten query.
    #[must_use]
    pub fn rewritten(mut self, query: impl Into<String>) -> Self {
        self.rewritten_query = Some(query.into());
        self
    }

    /// Marks this stage as the last one to run.
    #[must_use]
    pub fn stop(mut self) -> Self {
        self.should_continue = false;
        self
    }
}

/// One search stage. Implementations are stateless; per-search state
/// travels through the query string and the [`SearchContext`].
pub trait SearchStage: Send + Sync {
    /// Stage name used in logs.
    fn name(&self) -> &'static str;

    /// Weight of this stage's scores in the combined mean.
    fn weight(&self) -> f32;

    /// Exclusive stages end the search as soon as they produce a
    /// qualifying result.
    fn exclusive(&self) -> bool {
        false
    }

    fn find(&self, query: &str, ctx: &SearchContext<'_>) -> EngineResult<StageOutcome>;
}

/// Runs stages in order and folds their scores into one ranked list.
pub struct SearchPipeline {
    stages: Vec<Box<dyn SearchStage>>,
}

impl SearchPipeline {
    /// The standard lineup: DOI, exact title, author, keyword, semantic.
    #[must_use]
    pub fn standard() -> Self {
        Self::with_stages(vec![
            Box::new(DoiStage),
            Box::new(ExactTitleStage),
            Box::new(AuthorStage),
            Box::new(KeywordStage),
            Box::new(SemanticStage),
        ])
    }

    #[must_use]
    pub fn with_stages(stages: Vec<Box<dyn SearchStage>>) -> Self {
        Self { stages }
    }

    /// Runs `query` through the stages and returns papers ranked by the
    /// weighted mean of the contributing stages' scores.
    ///
    /// The divisor is the summed weight of the stages that produced at
    /// least one qualifying result, so a paper flagged by a single stage
    /// keeps that stage's score undiluted by stages that found nothing.
    pub fn search(&self, query: &str, ctx: &SearchContext<'_>) -> EngineResult<Vec<SearchHit>> {
        let mut combined_scores: HashMap<PaperId, f32> = HashMap::new();
        let mut combined_factor = 0.0f32;
        let mut query = query.trim().to_string();

        for stage in &self.stages {
            if query.is_empty() {
                break;
            }

            let outcome = stage.find(&query, ctx)?;

            let mut qualifying = 0usize;
            for (id, score) in &outcome.matches {
                if *score > ctx.score_min {
                    *combined_scores.entry(*id).or_insert(0.0) += score * stage.weight();
                    qualifying += 1;
                }
            }
            if qualifying > 0 {
                combined_factor += stage.weight();
            }
            tracing::debug!(
                stage = stage.name(),
                matches = outcome.matches.len(),
                qualifying,
                "search stage finished"
            );

            if stage.exclusive() && qualifying > 0 {
                tracing::debug!(stage = stage.name(), "exclusive match, ending search");
                break;
            }
            if let Some(rewritten) = outcome.rewritten_query {
                query = rewritten.trim().to_string();
            }
            if !outcome.should_continue {
                break;
            }
        }

        if combined_factor <= 0.0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = combined_scores
            .into_iter()
            .map(|(id, score)| SearchHit::new(id, score / combined_factor))
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.paper_id.cmp(&b.paper_id))
        });
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EmbeddingCache;
    use crate::config::Settings;
    use crate::corpus::InMemoryCorpus;
    use crate::encoder::{Encoder, MockEmbeddingGenerator, SentenceEncoder};
    use crate::types::PaperId;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scaffold() -> (tempfile::TempDir, InMemoryCorpus, EmbeddingCache) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.workspace_root = Some(dir.path().to_path_buf());
        let encoder: Arc<dyn Encoder> =
            Arc::new(SentenceEncoder::new(Arc::new(MockEmbeddingGenerator::new())));
        let cache = EmbeddingCache::open(&settings, encoder).unwrap();
        (dir, InMemoryCorpus::new(), cache)
    }

    fn pid(id: u32) -> PaperId {
        PaperId::new(id).unwrap()
    }

    /// Scripted stage: returns a fixed outcome and counts invocations.
    struct ScriptedStage {
        name: &'static str,
        weight: f32,
        exclusive: bool,
        matches: Vec<(PaperId, f32)>,
        rewrite: Option<String>,
        continue_after: bool,
        calls: Arc<AtomicUsize>,
        seen_queries: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    impl ScriptedStage {
        fn new(name: &'static str, weight: f32, matches: Vec<(PaperId, f32)>) -> Self {
            Self {
                name,
                weight,
                exclusive: false,
                matches,
                rewrite: None,
                continue_after: true,
                calls: Arc::new(AtomicUsize::new(0)),
                seen_queries: Arc::new(parking_lot::Mutex::new(Vec::new())),
            }
        }

        fn exclusive(mut self) -> Self {
            self.exclusive = true;
            self
        }

        fn rewriting(mut self, query: &str) -> Self {
            self.rewrite = Some(query.to_string());
            self
        }

        fn stopping(mut self) -> Self {
            self.continue_after = false;
            self
        }

        fn call_counter(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.calls)
        }

        fn query_log(&self) -> Arc<parking_lot::Mutex<Vec<String>>> {
            Arc::clone(&self.seen_queries)
        }
    }

    impl SearchStage for ScriptedStage {
        fn name(&self) -> &'static str {
            self.name
        }

        fn weight(&self) -> f32 {
            self.weight
        }

        fn exclusive(&self) -> bool {
            self.exclusive
        }

        fn find(&self, query: &str, _ctx: &SearchContext<'_>) -> EngineResult<StageOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_queries.lock().push(query.to_string());
            let mut outcome = StageOutcome::with_matches(self.matches.clone());
            outcome.rewritten_query = self.rewrite.clone();
            outcome.should_continue = self.continue_after;
            Ok(outcome)
        }
    }

    #[test]
    fn test_exclusive_stage_with_match_skips_later_stages() {
        let (_dir, corpus, cache) = scaffold();
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let first = ScriptedStage::new("doi", 1.0, vec![(pid(7), 10.0)]).exclusive();
        let second = ScriptedStage::new("title", 2.0, vec![(pid(8), 0.95)]);
        let third = ScriptedStage::new("semantic", 1.0, vec![(pid(9), 0.9)]);
        let second_calls = second.call_counter();
        let third_calls = third.call_counter();

        let pipeline =
            SearchPipeline::with_stages(vec![Box::new(first), Box::new(second), Box::new(third)]);
        let hits = pipeline.search("10.1000/xyz", &ctx).unwrap();

        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].paper_id, pid(7));
        assert!((hits[0].score - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_exclusive_stage_without_match_does_not_stop() {
        let (_dir, corpus, cache) = scaffold();
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let first = ScriptedStage::new("doi", 1.0, vec![]).exclusive();
        let second = ScriptedStage::new("keyword", 0.4, vec![(pid(3), 0.8)]);
        let second_calls = second.call_counter();

        let pipeline = SearchPipeline::with_stages(vec![Box::new(first), Box::new(second)]);
        let hits = pipeline.search("anything", &ctx).unwrap();

        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_single_contributing_stage_keeps_raw_score() {
        let (_dir, corpus, cache) = scaffold();
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        // Three equally weighted stages, only the middle one scores.
        let pipeline = SearchPipeline::with_stages(vec![
            Box::new(ScriptedStage::new("a", 1.0, vec![])),
            Box::new(ScriptedStage::new("b", 1.0, vec![(pid(1), 0.9)])),
            Box::new(ScriptedStage::new("c", 1.0, vec![])),
        ]);
        let hits = pipeline.search("query", &ctx).unwrap();

        assert_eq!(hits.len(), 1);
        assert!(
            (hits[0].score - 0.9).abs() < 1e-6,
            "expected raw stage score, got {}",
            hits[0].score
        );
    }

    #[test]
    fn test_weighted_mean_over_contributing_stages() {
        let (_dir, corpus, cache) = scaffold();
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let pipeline = SearchPipeline::with_stages(vec![
            Box::new(ScriptedStage::new("title", 2.0, vec![(pid(1), 0.95)])),
            Box::new(ScriptedStage::new("semantic", 1.0, vec![(pid(1), 0.8), (pid(2), 0.7)])),
        ]);
        let hits = pipeline.search("query", &ctx).unwrap();

        // factor = 2.0 + 1.0; paper 1 saw both stages, paper 2 only one.
        let expected_first = (2.0 * 0.95 + 0.8) / 3.0;
        let expected_second = 0.7 / 3.0;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].paper_id, pid(1));
        assert!((hits[0].score - expected_first).abs() < 1e-6);
        assert!((hits[1].score - expected_second).abs() < 1e-6);
    }

    #[test]
    fn test_scores_at_or_below_threshold_do_not_contribute() {
        let (_dir, corpus, cache) = scaffold();
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let pipeline = SearchPipeline::with_stages(vec![Box::new(ScriptedStage::new(
            "semantic",
            1.0,
            vec![(pid(1), 0.65), (pid(2), 0.64), (pid(3), 0.66)],
        ))]);
        let hits = pipeline.search("query", &ctx).unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].paper_id, pid(3));
    }

    #[test]
    fn test_stage_with_only_subthreshold_matches_adds_no_weight() {
        let (_dir, corpus, cache) = scaffold();
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        // The first stage's matches all fall below the threshold, so its
        // weight must not dilute the second stage's score.
        let pipeline = SearchPipeline::with_stages(vec![
            Box::new(ScriptedStage::new("weak", 5.0, vec![(pid(1), 0.1)])),
            Box::new(ScriptedStage::new("strong", 1.0, vec![(pid(2), 0.9)])),
        ]);
        let hits = pipeline.search("query", &ctx).unwrap();

        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_empty_rewritten_query_stops_after_scoring_that_stage() {
        let (_dir, corpus, cache) = scaffold();
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let first = ScriptedStage::new("author", 0.3, vec![(pid(4), 1.0)]).rewriting("");
        let second = ScriptedStage::new("keyword", 0.4, vec![(pid(5), 0.8)]);
        let second_calls = second.call_counter();

        let pipeline = SearchPipeline::with_stages(vec![Box::new(first), Box::new(second)]);
        let hits = pipeline.search("knuth", &ctx).unwrap();

        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        // The rewriting stage's own matches survive.
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].paper_id, pid(4));
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_should_continue_false_ends_pipeline() {
        let (_dir, corpus, cache) = scaffold();
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let first = ScriptedStage::new("title", 2.0, vec![(pid(1), 0.95)]).stopping();
        let second = ScriptedStage::new("semantic", 1.0, vec![(pid(2), 0.9)]);
        let second_calls = second.call_counter();

        let pipeline = SearchPipeline::with_stages(vec![Box::new(first), Box::new(second)]);
        let hits = pipeline.search("an exact title", &ctx).unwrap();

        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_rewritten_query_reaches_next_stage() {
        let (_dir, corpus, cache) = scaffold();
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let first = ScriptedStage::new("author", 0.3, vec![]).rewriting("residual terms");
        let second = ScriptedStage::new("keyword", 0.4, vec![(pid(1), 0.8)]);
        let second_queries = second.query_log();

        let pipeline = SearchPipeline::with_stages(vec![Box::new(first), Box::new(second)]);
        pipeline.search("knuth residual terms", &ctx).unwrap();

        assert_eq!(second_queries.lock().as_slice(), ["residual terms"]);
    }

    #[test]
    fn test_blank_query_runs_no_stages() {
        let (_dir, corpus, cache) = scaffold();
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let stage = ScriptedStage::new("semantic", 1.0, vec![(pid(1), 0.9)]);
        let calls = stage.call_counter();

        let pipeline = SearchPipeline::with_stages(vec![Box::new(stage)]);
        let hits = pipeline.search("   ", &ctx).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_results_sorted_by_score_then_id() {
        let (_dir, corpus, cache) = scaffold();
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let pipeline = SearchPipeline::with_stages(vec![Box::new(ScriptedStage::new(
            "semantic",
            1.0,
            vec![(pid(5), 0.7), (pid(2), 0.9), (pid(9), 0.7)],
        ))]);
        let hits = pipeline.search("query", &ctx).unwrap();

        let order: Vec<u32> = hits.iter().map(|h| h.paper_id.get()).collect();
        assert_eq!(order, vec![2, 5, 9]);
    }
}
