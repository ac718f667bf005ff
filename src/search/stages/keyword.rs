//! Keyword title stage.

use crate::error::EngineResult;
use crate::search::stopwords::content_words;
use crate::search::{SearchContext, SearchStage, StageOutcome};

/// Flat score for a title containing every keyword.
const KEYWORD_BASE_SCORE: f32 = 0.8;

/// Plain substring search: papers whose titles contain every
/// non-stopword query term, case-insensitively.
pub struct KeywordStage;

impl SearchStage for KeywordStage {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn weight(&self) -> f32 {
        0.4
    }

    fn find(&self, query: &str, ctx: &SearchContext<'_>) -> EngineResult<StageOutcome> {
        let keywords: Vec<String> = content_words(query)
            .into_iter()
            .map(str::to_lowercase)
            .collect();
        if keywords.is_empty() {
            return Ok(StageOutcome::empty());
        }

        let mut matches = Vec::new();
        for paper in ctx.corpus.papers() {
            let title = paper.title.to_lowercase();
            if keywords.iter().all(|keyword| title.contains(keyword.as_str())) {
                matches.push((paper.id, KEYWORD_BASE_SCORE));
            }
        }
        Ok(StageOutcome::with_matches(matches))
    }
}
