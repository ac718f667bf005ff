//! Near-exact title stage.

use crate::error::EngineResult;
use crate::search::trigram::trigram_similarity;
use crate::search::{SearchContext, SearchStage, StageOutcome};

/// Similarity a title must exceed to count as the paper the user typed.
const TITLE_SIMILARITY_MIN: f32 = 0.9;

/// Catches queries that are a paper title, modulo typos. A hit ends the
/// pipeline: the user asked for one specific paper.
pub struct ExactTitleStage;

impl SearchStage for ExactTitleStage {
    fn name(&self) -> &'static str {
        "exact-title"
    }

    fn weight(&self) -> f32 {
        2.0
    }

    fn find(&self, query: &str, ctx: &SearchContext<'_>) -> EngineResult<StageOutcome> {
        let mut matches = Vec::new();
        for paper in ctx.corpus.papers() {
            let similarity = trigram_similarity(query, &paper.title);
            if similarity > TITLE_SIMILARITY_MIN {
                matches.push((paper.id, similarity));
            }
        }

        if matches.is_empty() {
            Ok(StageOutcome::empty())
        } else {
            Ok(StageOutcome::with_matches(matches).stop())
        }
    }
}
