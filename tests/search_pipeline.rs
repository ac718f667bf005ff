//! End-to-end search scenarios across the full stage pipeline.

mod common;

use std::sync::Arc;

use common::{open_engine, pid, themed_corpus};
use paperlens::{InMemoryCorpus, Paper, SearchHit};

fn ids(hits: &[SearchHit]) -> Vec<u32> {
    hits.iter().map(|hit| hit.paper_id.get()).collect()
}

#[test]
fn doi_query_resolves_exclusively() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());
    let engine = open_engine(corpus, dir.path());
    engine.update(false).unwrap();

    let hits = engine.search("10.1/c1").unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].paper_id, pid(3));
    assert!((hits[0].score - 10.0).abs() < f32::EPSILON);
}

#[test]
fn doi_lookup_needs_no_embeddings() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());
    let engine = open_engine(corpus, dir.path());

    // No update has run; the cache is empty.
    let hits = engine.search("10.1/v1").unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].paper_id, pid(1));
    assert!((hits[0].score - 10.0).abs() < f32::EPSILON);
}

#[test]
fn url_form_doi_is_looked_up_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());
    let engine = open_engine(corpus, dir.path());
    engine.update(false).unwrap();

    // The corpus stores the bare DOI, so the URL form matches nothing in
    // the DOI stage and the query falls through to the later stages.
    let hits = engine.search("https://doi.org/10.1/c1").unwrap();

    assert!(hits.len() > 1);
    assert!(hits.iter().all(|hit| hit.score < 10.0));
}

#[test]
fn exact_title_match_wins_outright() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());
    let engine = open_engine(corpus, dir.path());
    engine.update(false).unwrap();

    let hits = engine.search("Quantum error correction").unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].paper_id, pid(5));
    assert!((hits[0].score - 1.0).abs() < 1e-6);
}

#[test]
fn author_only_query_scores_their_papers_at_full_weight() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());
    let engine = open_engine(corpus, dir.path());
    engine.update(false).unwrap();

    // "keller" is consumed by the author stage, leaving nothing for the
    // rest of the pipeline to dilute the combined score with.
    let hits = engine.search("keller").unwrap();

    assert_eq!(ids(&hits), vec![1, 2]);
    for hit in &hits {
        assert!((hit.score - 1.0).abs() < 1e-6);
    }
}

#[test]
fn author_and_topic_words_combine_across_stages() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());
    let engine = open_engine(corpus, dir.path());
    engine.update(false).unwrap();

    // The author stage consumes "keller" and rewrites the query to
    // "quantum", which the keyword and semantic stages then score. The
    // quantum papers collect two stage scores and outrank Keller's own.
    let hits = engine.search("keller quantum").unwrap();

    assert_eq!(ids(&hits), vec![5, 6, 1, 2, 3, 4]);
    assert!(hits[0].score > hits[2].score);
    assert!(hits[2].score > hits[4].score);
}

#[test]
fn keyword_match_boosts_the_title_naming_every_word() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());
    let engine = open_engine(corpus, dir.path());
    engine.update(false).unwrap();

    // Both quantum papers tie semantically; only the title containing
    // "quantum" and "hardware" gets the keyword boost on top.
    let hits = engine.search("quantum hardware").unwrap();

    assert_eq!(hits[0].paper_id, pid(6));
    assert_eq!(hits[1].paper_id, pid(5));
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn semantic_ranking_orders_papers_by_theme() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());
    let engine = open_engine(corpus, dir.path());
    engine.update(false).unwrap();

    let hits = engine.search("virus spread").unwrap();

    assert_eq!(ids(&hits), vec![1, 2, 3, 4, 5, 6]);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert!((hits[1].score - 1.0).abs() < 1e-6);
    assert!(hits[2].score < 1.0);
}

#[test]
fn keyword_boost_reorders_a_semantic_tie() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());
    let engine = open_engine(corpus, dir.path());
    engine.update(false).unwrap();

    // Papers 1 and 2 embed identically for "viral", but only the title
    // of paper 2 contains the word itself.
    let hits = engine.search("viral").unwrap();

    assert_eq!(ids(&hits), vec![2, 1, 3, 4, 5, 6]);
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn semantic_only_match_is_undiluted() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(InMemoryCorpus::new());
    corpus.insert(Paper::new(
        pid(1),
        "10.3/a",
        "Coronavirus genome assembly",
        "Virus genome data.",
    ));
    corpus.insert(Paper::new(
        pid(2),
        "10.3/b",
        "Lecture notes on arithmetic",
        "Sums and products.",
    ));
    corpus.insert(Paper::new(
        pid(3),
        "10.3/c",
        "A survey of gardening",
        "Soil and seasons.",
    ));
    let engine = open_engine(corpus, dir.path());
    engine.update(false).unwrap();

    // No title contains "viral", so the semantic stage is the only one
    // that qualifies and its scores pass through without dilution.
    let hits = engine.search("viral").unwrap();

    assert_eq!(ids(&hits), vec![1, 2, 3]);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert!(hits[1].score < 1.0);
}

#[test]
fn empty_query_finds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());
    let engine = open_engine(corpus, dir.path());
    engine.update(false).unwrap();

    assert!(engine.search("").unwrap().is_empty());
}

#[test]
fn no_qualifying_stage_means_no_hits() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());
    let engine = open_engine(corpus, dir.path());

    // With an empty cache the semantic stage stands down, and the query
    // matches no DOI, title, author, or keyword.
    let hits = engine.search("zzz unrelated nonsense").unwrap();

    assert!(hits.is_empty());
}
