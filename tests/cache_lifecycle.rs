//! Embedding artifact lifecycle exercised through the engine facade.

mod common;

use std::sync::Arc;

use common::{open_engine, pid, themed_corpus};
use paperlens::{Corpus, Paper};

#[test]
fn update_is_incremental_across_calls() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());
    let engine = open_engine(corpus.clone(), dir.path());

    let first = engine.update(false).unwrap();
    assert_eq!(first.encoded, 6);
    assert_eq!(first.skipped, 0);
    assert!(first.changed());

    let second = engine.update(false).unwrap();
    assert_eq!(second.encoded, 0);
    assert_eq!(second.skipped, 6);
    assert!(!second.changed());

    corpus.insert(Paper::new(
        pid(7),
        "10.1/v3",
        "Antiviral drug screening",
        "Virus inhibition assays.",
    ));
    let third = engine.update(false).unwrap();
    assert_eq!(third.encoded, 1);
    assert_eq!(third.skipped, 6);
    assert_eq!(engine.cache().len(), 7);

    corpus.remove(pid(7));
    let fourth = engine.update(false).unwrap();
    assert_eq!(fourth.removed, 1);
    assert_eq!(engine.cache().len(), 6);
    assert!(!engine.cache().contains(pid(7)));
}

#[test]
fn update_marks_papers_vectorized() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());
    let engine = open_engine(corpus.clone(), dir.path());

    assert!(corpus.papers().iter().all(|p| !p.vectorized));
    engine.update(false).unwrap();
    assert!(corpus.papers().iter().all(|p| p.vectorized));
}

#[test]
fn force_reencodes_every_paper() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());
    let engine = open_engine(corpus, dir.path());

    engine.update(false).unwrap();
    let forced = engine.update(true).unwrap();

    assert_eq!(forced.encoded, 6);
    assert_eq!(forced.skipped, 0);
}

#[test]
fn touched_paper_is_reencoded_on_the_next_update() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());
    let engine = open_engine(corpus.clone(), dir.path());

    engine.update(false).unwrap();
    corpus.touch(pid(3));

    let stats = engine.update(false).unwrap();
    assert_eq!(stats.encoded, 1);
    assert_eq!(stats.skipped, 5);
}

#[test]
fn reopened_engine_serves_the_persisted_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());

    {
        let engine = open_engine(corpus.clone(), dir.path());
        engine.update(false).unwrap();
    }

    // A fresh engine loads the artifact and answers without re-encoding.
    let engine = open_engine(corpus, dir.path());
    assert_eq!(engine.cache().len(), 6);
    assert!(engine.cache().last_updated().unwrap().is_some());

    let hits = engine.search("virus spread").unwrap();
    assert_eq!(hits[0].paper_id, pid(1));

    let similar = engine.similar(pid(5), 3).unwrap();
    assert_eq!(similar[0].paper_id, pid(6));
}

#[test]
fn incremental_updates_match_a_fresh_rebuild() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    // Workspace A grows in two steps; workspace B encodes the same six
    // papers in one pass.
    let corpus_a = Arc::new(themed_corpus());
    let corpus_b = Arc::new(themed_corpus());
    corpus_a.remove(pid(5));
    corpus_a.remove(pid(6));

    let engine_a = open_engine(corpus_a.clone(), dir_a.path());
    engine_a.update(false).unwrap();
    corpus_a.insert(corpus_b.paper(pid(5)).unwrap());
    corpus_a.insert(corpus_b.paper(pid(6)).unwrap());
    engine_a.update(false).unwrap();

    let engine_b = open_engine(corpus_b.clone(), dir_b.path());
    engine_b.update(false).unwrap();

    let cache_a = engine_a.cache();
    let cache_b = engine_b.cache();
    let matrix_a = cache_a.matrix();
    let matrix_b = cache_b.matrix();
    assert_eq!(matrix_a.ids(), matrix_b.ids());
    for paper in corpus_b.papers() {
        let row_a = matrix_a.row_of(paper.id).unwrap();
        let row_b = matrix_b.row_of(paper.id).unwrap();
        assert_eq!(matrix_a.titles().row(row_a), matrix_b.titles().row(row_b));
        assert_eq!(
            matrix_a.abstracts().row(row_a),
            matrix_b.abstracts().row(row_b)
        );
    }
}

#[test]
fn second_engine_sees_the_artifact_the_first_wrote() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(themed_corpus());

    let writer = open_engine(corpus.clone(), dir.path());
    let reader = open_engine(corpus, dir.path());
    assert!(reader.cache().is_empty());

    writer.update(false).unwrap();

    // The reader refreshes from disk on its next query.
    let hits = reader.search("virus spread").unwrap();
    assert_eq!(hits[0].paper_id, pid(1));
    assert_eq!(reader.cache().len(), 6);
}
