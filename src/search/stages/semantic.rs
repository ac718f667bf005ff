//! Semantic embedding stage.

use crate::error::EngineResult;
use crate::search::{SearchContext, SearchStage, StageOutcome};
use crate::similarity::metric_for;

/// Scores every cached paper against the encoded query. The title and
/// abstract matrices contribute equally via the cache's title weight.
pub struct SemanticStage;

impl SearchStage for SemanticStage {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn weight(&self) -> f32 {
        1.0
    }

    fn find(&self, query: &str, ctx: &SearchContext<'_>) -> EngineResult<StageOutcome> {
        let cache = ctx.cache;
        if cache.is_empty() {
            return Ok(StageOutcome::empty());
        }

        let query_vector = cache.encoder().encode_query(query)?;
        let metric = metric_for(cache.kind());
        let title_importance = cache.title_importance();

        let matrix = cache.matrix();
        let title_scores = metric.scores(&query_vector, matrix.titles());
        let abstract_scores = metric.scores(&query_vector, matrix.abstracts());

        let mut matches = Vec::new();
        for (row, id) in matrix.ids().iter().enumerate() {
            let score = title_importance * title_scores[row].get()
                + (1.0 - title_importance) * abstract_scores[row].get();
            if score > ctx.score_min {
                matches.push((*id, score));
            }
        }
        Ok(StageOutcome::with_matches(matches))
    }
}
