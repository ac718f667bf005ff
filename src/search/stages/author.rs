//! Author name stage.

use std::collections::HashSet;

use crate::error::EngineResult;
use crate::search::trigram::trigram_similarity;
use crate::search::{SearchContext, SearchStage, StageOutcome};
use crate::types::PaperId;

/// Similarity at which a query word counts as an author name and is
/// dropped from the query handed to later stages.
const NAME_CONSUME_MIN: f32 = 0.85;

/// Matched authors' papers all score the same; the trigram similarity
/// only decides which authors match.
const AUTHOR_MATCH_SCORE: f32 = 1.0;

/// Matches query words against author names. Last names collect the
/// author's papers; first names only consume the word, so "thomas" does
/// not flood the result with every Thomas's papers.
pub struct AuthorStage;

impl SearchStage for AuthorStage {
    fn name(&self) -> &'static str {
        "author"
    }

    fn weight(&self) -> f32 {
        0.3
    }

    fn find(&self, query: &str, ctx: &SearchContext<'_>) -> EngineResult<StageOutcome> {
        let authors = ctx.corpus.authors();
        let mut matched_papers: HashSet<PaperId> = HashSet::new();
        let mut remaining_words: Vec<&str> = Vec::new();

        for word in query.split_whitespace() {
            let mut best_similarity = 0.0f32;
            let mut last_name_matched = false;

            for author in &authors {
                let similarity = trigram_similarity(&author.last_name, word);
                if similarity > ctx.score_min {
                    last_name_matched = true;
                    best_similarity = best_similarity.max(similarity);
                    matched_papers.extend(author.paper_ids.iter().copied());
                }
            }

            if !last_name_matched {
                for author in &authors {
                    let similarity = trigram_similarity(&author.first_name, word);
                    if similarity > ctx.score_min {
                        best_similarity = best_similarity.max(similarity);
                    }
                }
            }

            if best_similarity < NAME_CONSUME_MIN {
                remaining_words.push(word);
            }
        }

        let mut matches: Vec<(PaperId, f32)> = matched_papers
            .into_iter()
            .map(|id| (id, AUTHOR_MATCH_SCORE))
            .collect();
        matches.sort_by_key(|(id, _)| *id);

        Ok(StageOutcome::with_matches(matches).rewritten(remaining_words.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EmbeddingCache;
    use crate::config::Settings;
    use crate::corpus::InMemoryCorpus;
    use crate::encoder::{MockEmbeddingGenerator, SentenceEncoder};
    use crate::types::{Author, Paper, PaperId};
    use std::sync::Arc;

    fn pid(id: u32) -> PaperId {
        PaperId::new(id).unwrap()
    }

    fn scaffold() -> (tempfile::TempDir, InMemoryCorpus, EmbeddingCache) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.workspace_root = Some(dir.path().to_path_buf());
        let encoder = Arc::new(SentenceEncoder::new(Arc::new(MockEmbeddingGenerator::new())));
        let cache = EmbeddingCache::open(&settings, encoder).unwrap();

        let corpus = InMemoryCorpus::new();
        corpus.insert(Paper::new(pid(1), "10.1/a", "Sorting networks", ""));
        corpus.insert(Paper::new(pid(2), "10.1/b", "Clocks and ordering", ""));
        corpus.set_authors(vec![
            Author {
                first_name: "Donald".to_string(),
                last_name: "Knuth".to_string(),
                paper_ids: vec![pid(1)],
            },
            Author {
                first_name: "Leslie".to_string(),
                last_name: "Lamport".to_string(),
                paper_ids: vec![pid(2)],
            },
        ]);
        (dir, corpus, cache)
    }

    #[test]
    fn test_exact_last_name_collects_papers_and_consumes_word() {
        let (_dir, corpus, cache) = scaffold();
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let outcome = AuthorStage.find("knuth sorting", &ctx).unwrap();

        assert_eq!(outcome.matches, vec![(pid(1), 1.0)]);
        assert_eq!(outcome.rewritten_query.as_deref(), Some("sorting"));
        assert!(outcome.should_continue);
    }

    #[test]
    fn test_close_last_name_matches_but_word_stays() {
        let (_dir, corpus, cache) = scaffold();
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        // "lamports" is similar enough to match the author but not
        // similar enough to be consumed.
        let outcome = AuthorStage.find("lamports clocks", &ctx).unwrap();

        assert_eq!(outcome.matches, vec![(pid(2), 1.0)]);
        assert_eq!(outcome.rewritten_query.as_deref(), Some("lamports clocks"));
    }

    #[test]
    fn test_first_name_consumes_without_collecting_papers() {
        let (_dir, corpus, cache) = scaffold();
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let outcome = AuthorStage.find("donald sorting", &ctx).unwrap();

        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.rewritten_query.as_deref(), Some("sorting"));
    }

    #[test]
    fn test_plain_topic_query_passes_through() {
        let (_dir, corpus, cache) = scaffold();
        let ctx = SearchContext::new(&corpus, &cache, 0.65);

        let outcome = AuthorStage.find("distributed consensus", &ctx).unwrap();

        assert!(outcome.matches.is_empty());
        assert_eq!(
            outcome.rewritten_query.as_deref(),
            Some("distributed consensus")
        );
    }
}
