//! End-to-end search behavior over a realistic mini catalog.
//!
//! Covers the query syntax (filters, phrases, negations), lexical-only
//! degradation, and the debounced interactive session.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{engine, names, package, paper, resource};
use quarry::{
    fuse, parse, BoostConfig, Corpus, EmbeddingAsset, EmbeddingEncoding, EmbeddingMetadata,
    EngineConfig, FieldWeights, LexicalIndex, SearchEngine, SearchSession,
};

// ============================================================================
// FILTERS AND NEGATIONS
// ============================================================================

#[test]
fn year_filter_is_hard() {
    let e = engine(&[
        paper("Causal Forests", "heterogeneous effects", &["Athey"], 2023),
        paper("Causal Forests Old", "earlier treatment", &["Athey"], 2020),
    ]);
    let outcome = e.search("year:2023 causal");
    let ranked = names(&e, &outcome);
    assert_eq!(ranked, vec!["Causal Forests".to_string()]);
}

#[test]
fn negation_excludes_despite_strong_match() {
    let e = engine(&[
        package("Regression Kit", "deprecated regression toolkit", &[], 0.9),
        package("Fresh Regression", "modern regression estimators", &[], 0.1),
    ]);
    let outcome = e.search("-deprecated regression");
    let ranked = names(&e, &outcome);
    assert_eq!(ranked, vec!["Fresh Regression".to_string()]);
}

#[test]
fn phrase_requires_exact_substring() {
    let e = engine(&[
        resource("DiD Guide", "covers difference in differences estimation"),
        resource("Split Guide", "a difference of two differences view"),
    ]);
    let outcome = e.search("\"difference in differences\"");
    let ranked = names(&e, &outcome);
    assert_eq!(ranked, vec!["DiD Guide".to_string()]);
}

#[test]
fn author_filter_matches_projected_authors() {
    let e = engine(&[
        paper("Causality", "the book", &["Judea Pearl"], 2009),
        paper("Mostly Harmless", "econometrics", &["Angrist", "Pischke"], 2008),
    ]);
    let outcome = e.search("author:pearl");
    let ranked = names(&e, &outcome);
    assert_eq!(ranked, vec!["Causality".to_string()]);
}

#[test]
fn type_filter_restricts_kind() {
    let e = engine(&[
        package("Causal Toolbox", "estimation library", &[], 0.0),
        paper("Causal Toolbox", "survey of estimation", &[], 2022),
    ]);
    let outcome = e.search("type:papers causal toolbox");
    assert_eq!(outcome.candidates.len(), 1);
    let doc = &e.corpus().docs[outcome.candidates[0].doc_idx];
    assert_eq!(doc.id, "paper-causal-toolbox");
}

// ============================================================================
// DEGRADATION
// ============================================================================

#[test]
fn lexical_only_is_plain_rrf_order() {
    let entries = vec![
        package("Causal Forests", "tree ensembles", &[], 0.0),
        package("Causal Graphs", "dag tooling", &[], 0.0),
        package("Survival Kit", "time to event", &[], 0.0),
    ];
    let corpus = Corpus::load(&entries).unwrap();
    let lexical = LexicalIndex::build(&corpus, FieldWeights::default()).unwrap();
    let parsed = parse("causal");
    let hits = lexical.search(&parsed.clean_query);
    assert!(!hits.is_empty());

    let fused = fuse(&hits, &[], &parsed, &BoostConfig::default(), &corpus);
    assert_eq!(fused.len(), hits.len());
    // boosts apply uniformly here, so fusion preserves the lexical order
    let fused_order: Vec<usize> = fused.iter().map(|c| c.doc_idx).collect();
    let lexical_order: Vec<usize> = hits.iter().map(|h| h.doc_idx).collect();
    assert_eq!(fused_order, lexical_order);
}

#[test]
fn engine_survives_garbage_embeddings() {
    let entries = vec![package("Causal Forests", "trees", &[], 0.0)];
    let corpus = Corpus::load(&entries).unwrap();
    let metadata = EmbeddingMetadata {
        model: "broken".to_string(),
        dimensions: 8,
        count: 1,
        encoding: EmbeddingEncoding::F32le,
        ids: vec!["package-causal-forests".to_string()],
    };
    let e = SearchEngine::new(
        corpus,
        Some(EmbeddingAsset {
            blob: b"not a matrix",
            metadata,
        }),
        EngineConfig::default(),
    )
    .unwrap();
    assert!(!e.vector_available());
    assert!(e.vector_error().is_some());
    assert!(!e.search("causal").candidates.is_empty());
}

// ============================================================================
// RANKING
// ============================================================================

#[test]
fn exact_name_match_outranks_description_mention() {
    let e = engine(&[
        package("Deep Learner", "mentions causal in passing", &[], 0.0),
        package("Causal Learner", "double machine learning", &[], 0.0),
    ]);
    let outcome = e.search("causal");
    let ranked = names(&e, &outcome);
    assert_eq!(ranked[0], "Causal Learner");
}

#[test]
fn intent_word_prefers_learning_material() {
    let e = engine(&[
        package("Uplift Modeling", "uplift estimation", &["uplift"], 0.0),
        resource("Uplift Modeling Course", "uplift estimation walkthrough"),
    ]);
    let outcome = e.search("uplift tutorial");
    let ranked = names(&e, &outcome);
    assert_eq!(ranked[0], "Uplift Modeling Course");
}

#[test]
fn results_are_deterministic() {
    let e = engine(&[
        package("Alpha Causal", "one", &[], 0.3),
        package("Beta Causal", "two", &[], 0.3),
        package("Gamma Causal", "three", &[], 0.3),
    ]);
    let first = e.search("causal");
    for _ in 0..5 {
        let again = e.search("causal");
        let a: Vec<usize> = first.candidates.iter().map(|c| c.doc_idx).collect();
        let b: Vec<usize> = again.candidates.iter().map(|c| c.doc_idx).collect();
        assert_eq!(a, b);
    }
}

// ============================================================================
// INTERACTIVE SESSION
// ============================================================================

#[test]
fn debounce_coalesces_keystrokes_to_one_search() {
    let e = Arc::new(engine(&[package("Causal Forests", "trees", &[], 0.0)]));
    let mut session = SearchSession::with_debounce(e, Duration::from_millis(150));
    let t0 = Instant::now();

    session.keystroke("caus", t0);
    session.keystroke("causal", t0 + Duration::from_millis(50));

    // 160ms in: the first keystroke's window has passed, but it was
    // superseded and the newer one is still inside its window
    assert!(session.poll(t0 + Duration::from_millis(160)).is_none());

    let (generation, outcome) = session.poll(t0 + Duration::from_millis(200)).unwrap();
    assert_eq!(generation, 2);
    assert!(outcome.description.contains("causal"));
    assert!(!outcome.candidates.is_empty());

    // nothing left to execute
    assert!(session.poll(t0 + Duration::from_secs(1)).is_none());
    assert_eq!(session.current_generation(), Some(2));
}

#[test]
fn stale_generation_never_overwrites_newer_result() {
    let e = Arc::new(engine(&[
        package("Causal Forests", "trees", &[], 0.0),
        package("DoWhy", "graphs", &[], 0.0),
    ]));
    let mut session = SearchSession::new(e.clone());
    let t0 = Instant::now();

    let old_generation = session.keystroke("causal", t0);
    session.keystroke("dowhy", t0 + Duration::from_millis(10));
    let (new_generation, _) = session.poll(t0 + Duration::from_secs(1)).unwrap();

    let stale = e.search("causal");
    assert!(!session.try_apply(old_generation, stale));
    assert_eq!(session.current_generation(), Some(new_generation));
}
