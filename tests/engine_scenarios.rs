// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

use simscan::embedding::{Embedder, HashingProvider};
use simscan::store::{DocumentStore, Scope, SqliteStore};
use simscan::utils::index_file;
use simscan::{EngineSettings, Error, IndexRequest, SearchOptions, SimilarityEngine};

fn open_engine(data_dir: &Path) -> SimilarityEngine {
    let store = SqliteStore::open_default(data_dir).expect("open store");
    SimilarityEngine::open(
        Embedder::new(Box::new(HashingProvider::default())),
        Box::new(store),
        EngineSettings::new(index_file(data_dir)),
    )
    .expect("open engine")
}

fn permissive() -> SearchOptions {
    SearchOptions {
        threshold: 0.0,
        ..SearchOptions::default()
    }
}

#[test]
fn identical_text_is_fully_covered() {
    let dir = TempDir::new().expect("tempdir");
    let engine = open_engine(dir.path());
    let text = "The quick brown fox jumps over the lazy dog near the river bank.";
    let indexed = engine
        .index_document(IndexRequest::new("fox.txt", text))
        .expect("index");

    let report = engine.search(text, &SearchOptions::default()).expect("search");
    assert_eq!(report.matches.len(), 1);
    let best = &report.matches[0];
    assert_eq!(best.document_id, indexed.document_id);
    assert_eq!(best.source_filename, "fox.txt");
    assert_eq!(best.segments.len(), 1);
    assert_eq!(best.segments[0].start, 0);
    assert_eq!(best.segments[0].end, text.chars().count());
    assert_eq!(best.segments[0].text, text);
    assert!((best.similarity_score - 100.0).abs() < 1e-9);
    assert!((report.overall_similarity - 100.0).abs() < 1e-9);
    assert!((report.lexical_similarity - 100.0).abs() < 1e-9);
    assert!(best.semantic_score > 99.0);
}

#[test]
fn retrieval_without_shared_passage_is_not_a_match() {
    let dir = TempDir::new().expect("tempdir");
    let engine = open_engine(dir.path());
    engine
        .index_document(IndexRequest::new(
            "greek.txt",
            "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda",
        ))
        .expect("index");

    let report = engine
        .search(
            "lambda kappa iota theta eta zeta epsilon delta gamma beta alpha",
            &permissive(),
        )
        .expect("search");
    assert!(report.matches.is_empty());
    assert_eq!(report.overall_similarity, 0.0);
    assert!(report.semantic_similarity > 0.0);
    assert!((report.lexical_similarity - 100.0).abs() < 1e-9);
}

#[test]
fn replacing_a_file_keeps_only_the_latest_version() {
    let dir = TempDir::new().expect("tempdir");
    let engine = open_engine(dir.path());
    let first = "Volcanic soil is rich in minerals that crops readily absorb.";
    let second = format!("{} Farmers terrace the slopes to stop erosion.", first);

    let original = engine
        .index_document(IndexRequest::new("essay.txt", first).with_replace(true))
        .expect("index first version");
    assert!(original.replaced.is_empty());

    let revised = engine
        .index_document(IndexRequest::new("essay.txt", second.clone()).with_replace(true))
        .expect("index second version");
    assert_eq!(revised.replaced, vec![original.document_id.clone()]);

    let documents = engine.list_documents(None).expect("list");
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].id, revised.document_id);
    assert!(engine
        .store()
        .get_chunk(&original.document_id, 0)
        .expect("get chunk")
        .is_none());

    let report = engine.search(&second, &SearchOptions::default()).expect("search");
    assert_eq!(report.matches.len(), 1);
    assert_eq!(report.matches[0].document_id, revised.document_id);
}

#[test]
fn replace_leaves_other_scopes_and_names_alone() {
    let dir = TempDir::new().expect("tempdir");
    let engine = open_engine(dir.path());
    engine
        .index_document(
            IndexRequest::new("essay.txt", "A personal draft about tidal energy and turbines.")
                .with_scope(Scope::Personal { owner_id: 3 }),
        )
        .expect("index personal");
    engine
        .index_document(IndexRequest::new("other.txt", "Unrelated notes on medieval trade routes."))
        .expect("index other");

    let outcome = engine
        .index_document(
            IndexRequest::new("essay.txt", "The university copy about tidal energy.").with_replace(true),
        )
        .expect("index replacement");
    assert!(outcome.replaced.is_empty());
    assert_eq!(engine.stats().expect("stats").documents, 3);
}

#[test]
fn indexing_without_replace_keeps_both_versions() {
    let dir = TempDir::new().expect("tempdir");
    let engine = open_engine(dir.path());
    engine
        .index_document(IndexRequest::new("essay.txt", "First take on river deltas."))
        .expect("index first");
    let outcome = engine
        .index_document(IndexRequest::new("essay.txt", "Second take on river deltas."))
        .expect("index second");
    assert!(outcome.replaced.is_empty());
    assert_eq!(engine.stats().expect("stats").documents, 2);
}

#[test]
fn shared_substring_is_highlighted_in_query_coordinates() {
    let dir = TempDir::new().expect("tempdir");
    let engine = open_engine(dir.path());
    let shared = "abcdefghij".repeat(5);
    engine
        .index_document(IndexRequest::new("source.txt", format!("mmmmm{}nnnnn", shared)))
        .expect("index");

    let query = format!("ZZZZZ{}YYYYY", shared);
    let report = engine.search(&query, &permissive()).expect("search");
    assert_eq!(report.matches.len(), 1);

    let result = &report.matches[0];
    assert_eq!(result.segments.len(), 1);
    let segment = &result.segments[0];
    assert_eq!((segment.start, segment.end), (5, 55));
    assert_eq!(segment.text, shared);
    assert_eq!(segment.source_match_start, 5);
    assert!((result.similarity_score - 100.0 * 50.0 / 60.0).abs() < 1e-9);
}

#[test]
fn empty_repository_yields_empty_report() {
    let dir = TempDir::new().expect("tempdir");
    let engine = open_engine(dir.path());

    let report = engine
        .search("Any essay text that is worth checking.", &SearchOptions::default())
        .expect("search");
    assert!(report.matches.is_empty());
    assert_eq!(report.overall_similarity, 0.0);
    assert_eq!(report.semantic_similarity, 0.0);
}

#[test]
fn disjoint_text_has_no_matches() {
    let dir = TempDir::new().expect("tempdir");
    let engine = open_engine(dir.path());
    engine
        .index_document(IndexRequest::new(
            "numbers.txt",
            "0123456789 9876543210 1357924680 2468013579 1122334455",
        ))
        .expect("index");

    let report = engine
        .search(
            "Quantum chromodynamics describes strong interactions between quarks.",
            &SearchOptions::default(),
        )
        .expect("search");
    assert!(report.matches.is_empty());
    assert_eq!(report.overall_similarity, 0.0);
}

#[test]
fn query_with_only_whitespace_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let engine = open_engine(dir.path());
    let err = engine.search("   \n ", &SearchOptions::default()).unwrap_err();
    assert!(matches!(err, Error::EmptyContent(_)));
}

#[test]
fn delete_removes_every_trace() {
    let dir = TempDir::new().expect("tempdir");
    let engine = open_engine(dir.path());
    let text: String = (0..150).map(|i| format!("sentence {} ", i)).collect();
    let indexed = engine
        .index_document(IndexRequest::new("long.txt", text.clone()))
        .expect("index");
    assert!(indexed.chunk_count > 1);

    assert!(engine.delete_document(&indexed.document_id).expect("delete"));
    let stats = engine.stats().expect("stats");
    assert_eq!(stats.documents, 0);
    assert_eq!(stats.chunks, 0);
    assert_eq!(stats.embeddings, 0);
    assert_eq!(stats.live_vectors, 0);
    assert!(engine
        .store()
        .get_chunk(&indexed.document_id, 0)
        .expect("get chunk")
        .is_none());
    assert!(engine.search(&text, &permissive()).expect("search").matches.is_empty());
}

#[test]
fn expired_deadline_commits_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let engine = open_engine(dir.path());

    let err = engine
        .index_document(
            IndexRequest::new("late.txt", "A document that arrives after its deadline.")
                .with_timeout(Some(Duration::ZERO)),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert!(err.is_recoverable());

    let stats = engine.stats().expect("stats");
    assert_eq!(stats.documents, 0);
    assert_eq!(stats.chunks, 0);
    assert_eq!(stats.live_vectors, 0);
}

#[test]
fn search_deadline_is_reported_as_timeout() {
    let dir = TempDir::new().expect("tempdir");
    let engine = open_engine(dir.path());
    engine
        .index_document(IndexRequest::new("a.txt", "Some repository text for the deadline test."))
        .expect("index");

    let options = SearchOptions {
        timeout: Some(Duration::ZERO),
        ..SearchOptions::default()
    };
    let err = engine
        .search("Some repository text for the deadline test.", &options)
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}

#[test]
fn index_survives_reopen() {
    let dir = TempDir::new().expect("tempdir");
    let text = "Persistence means the vectors are still there after a restart.";
    let document_id = {
        let engine = open_engine(dir.path());
        engine
            .index_document(IndexRequest::new("persist.txt", text))
            .expect("index")
            .document_id
    };

    let engine = open_engine(dir.path());
    let stats = engine.stats().expect("stats");
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.live_vectors, 1);

    let report = engine.search(text, &SearchOptions::default()).expect("search");
    assert_eq!(report.matches.len(), 1);
    assert_eq!(report.matches[0].document_id, document_id);
}

#[test]
fn missing_index_file_is_rebuilt_from_store() {
    let dir = TempDir::new().expect("tempdir");
    let text = "Rebuilding restores the index from chunks kept in the store.";
    {
        let engine = open_engine(dir.path());
        engine
            .index_document(IndexRequest::new("rebuild.txt", text))
            .expect("index");
    }
    fs::remove_file(index_file(dir.path())).expect("remove index");

    let engine = open_engine(dir.path());
    assert!(index_file(dir.path()).exists());
    assert_eq!(engine.stats().expect("stats").live_vectors, 1);
    assert_eq!(
        engine
            .search(text, &SearchOptions::default())
            .expect("search")
            .matches
            .len(),
        1
    );
}

#[test]
fn personal_documents_stay_in_their_partition() {
    let dir = TempDir::new().expect("tempdir");
    let engine = open_engine(dir.path());
    let text = "Lecture notes on thermodynamics and the second law of entropy.";
    engine
        .index_document(IndexRequest::new("notes.txt", text).with_scope(Scope::Personal { owner_id: 7 }))
        .expect("index");

    let university = engine
        .list_documents(Some(&Scope::University))
        .expect("list");
    assert!(university.is_empty());

    let everything = engine.search(text, &SearchOptions::default()).expect("search");
    assert_eq!(everything.matches.len(), 1);

    let other_owner = SearchOptions {
        scope: Some(Scope::Personal { owner_id: 8 }),
        ..SearchOptions::default()
    };
    assert!(engine.search(text, &other_owner).expect("search").matches.is_empty());
}
