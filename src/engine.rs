// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The engine context: frozen corpus, both matchers, fusion config.
//!
//! Construction is the only fallible phase. After `SearchEngine::new`
//! returns, the corpus and indexes are immutable behind `Arc` and
//! `search` is infallible: a broken embedding asset was already mapped to
//! vector-unavailable, and fusion degrades to lexical-only.
//!
//! `SearchSession` layers interactive concerns on top: a debounce window
//! for keystroke streams and a monotonic generation counter so a slow
//! search can never overwrite the results of a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "parallel")]
use parking_lot::Mutex;
#[cfg(not(feature = "parallel"))]
use std::sync::Mutex;

use crate::fusion::{fuse, BoostConfig, VectorRanked};
use crate::lexical::{FieldWeights, LexicalIndex, WeightError};
use crate::query::{describe, parse};
use crate::types::{Corpus, ScoredCandidate};
use crate::vector::{EmbeddingMetadata, VectorIndex, VectorLoadError};

/// How deep the vector matcher ranks before fusion.
const VECTOR_TOP_K: usize = 50;

/// Default keystroke debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

// =============================================================================
// ENGINE
// =============================================================================

/// Everything `SearchEngine::new` needs besides the corpus.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub weights: FieldWeights,
    pub boosts: BoostConfig,
}

/// An embedding asset as loaded from disk or cache.
pub struct EmbeddingAsset<'a> {
    pub blob: &'a [u8],
    pub metadata: EmbeddingMetadata,
}

enum VectorState {
    Ready {
        index: VectorIndex,
        /// Matrix row → corpus position. `None` for rows whose id is not
        /// in the corpus (stale asset).
        row_to_doc: Vec<Option<usize>>,
    },
    Unavailable,
}

/// One completed search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Human-readable echo of how the query was interpreted.
    pub description: String,
    pub candidates: Vec<ScoredCandidate>,
}

pub struct SearchEngine {
    corpus: Arc<Corpus>,
    lexical: LexicalIndex,
    vector: VectorState,
    boosts: BoostConfig,
    vector_error: Option<VectorLoadError>,
}

impl SearchEngine {
    /// Build the engine. A missing or broken embedding asset is not an
    /// error here: the engine comes up vector-unavailable and records
    /// why in [`vector_error`](Self::vector_error).
    pub fn new(
        mut corpus: Corpus,
        embeddings: Option<EmbeddingAsset<'_>>,
        config: EngineConfig,
    ) -> Result<Self, WeightError> {
        let (vector, vector_error) = match embeddings {
            None => (VectorState::Unavailable, None),
            Some(asset) => match VectorIndex::load(asset.blob, &asset.metadata) {
                Ok(index) => {
                    let row_to_doc = align_rows(&mut corpus, index.ids());
                    (VectorState::Ready { index, row_to_doc }, None)
                }
                Err(error) => (VectorState::Unavailable, Some(error)),
            },
        };

        let lexical = LexicalIndex::build(&corpus, config.weights)?;
        Ok(SearchEngine {
            corpus: Arc::new(corpus),
            lexical,
            vector,
            boosts: config.boosts,
            vector_error,
        })
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    pub fn vector_available(&self) -> bool {
        matches!(self.vector, VectorState::Ready { .. })
    }

    /// Why the vector path is unavailable, if an asset was offered and
    /// rejected.
    pub fn vector_error(&self) -> Option<&VectorLoadError> {
        self.vector_error.as_ref()
    }

    /// Run the full pipeline for one query. Infallible: an empty or
    /// unparseable query yields an empty outcome, never an error.
    pub fn search(&self, raw: &str) -> SearchOutcome {
        let parsed = parse(raw);
        let description = describe(&parsed);
        if parsed.is_empty() {
            return SearchOutcome {
                description,
                candidates: Vec::new(),
            };
        }

        let clean = parsed.clean_query.as_str();
        if clean.is_empty() {
            // Filter-only query (`author:pearl`, `type:dataset`): neither
            // matcher has text to rank on, so list everything that passes
            // the filters, ordered by popularity.
            return SearchOutcome {
                description,
                candidates: self.filter_listing(&parsed),
            };
        }

        #[cfg(feature = "parallel")]
        let (lexical_hits, vector_hits) = rayon::join(
            || self.lexical.search(clean),
            || self.vector_hits(clean),
        );
        #[cfg(not(feature = "parallel"))]
        let (lexical_hits, vector_hits) = (self.lexical.search(clean), self.vector_hits(clean));

        let candidates = fuse(&lexical_hits, &vector_hits, &parsed, &self.boosts, &self.corpus);
        SearchOutcome {
            description,
            candidates,
        }
    }

    fn filter_listing(&self, parsed: &crate::query::ParsedQuery) -> Vec<ScoredCandidate> {
        let mut candidates: Vec<ScoredCandidate> = self
            .corpus
            .docs
            .iter()
            .enumerate()
            .filter(|(_, doc)| crate::query::matches_filters(doc, parsed))
            .map(|(doc_idx, doc)| {
                let popular = self.boosts.popularity_enabled && doc.model_score > 0.0;
                ScoredCandidate {
                    doc_idx,
                    lexical_score: None,
                    lexical_distance: None,
                    vector_similarity: None,
                    fused_score: if popular { doc.model_score } else { 0.0 },
                    boosts: if popular {
                        vec![crate::types::BoostTag::Popularity]
                    } else {
                        Vec::new()
                    },
                }
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.corpus.docs[a.doc_idx].id.cmp(&self.corpus.docs[b.doc_idx].id))
        });
        candidates
    }

    fn vector_hits(&self, clean: &str) -> Vec<VectorRanked> {
        let VectorState::Ready { index, row_to_doc } = &self.vector else {
            return Vec::new();
        };
        let Some(query) = index.query_embedding(clean, &self.lexical, &self.corpus) else {
            return Vec::new();
        };
        index
            .search(&query, VECTOR_TOP_K)
            .into_iter()
            .filter_map(|hit| {
                row_to_doc.get(hit.row).copied().flatten().map(|doc_idx| VectorRanked {
                    doc_idx,
                    similarity: hit.similarity,
                })
            })
            .collect()
    }
}

/// Link matrix rows to documents by id and stamp `embedding_row` onto the
/// documents before the corpus freezes.
fn align_rows(corpus: &mut Corpus, ids: &[String]) -> Vec<Option<usize>> {
    let by_id: std::collections::HashMap<&str, usize> = corpus
        .docs
        .iter()
        .enumerate()
        .map(|(i, d)| (d.id.as_str(), i))
        .collect();

    let row_to_doc: Vec<Option<usize>> = ids.iter().map(|id| by_id.get(id.as_str()).copied()).collect();
    for (row, doc_idx) in row_to_doc.iter().enumerate() {
        if let Some(doc_idx) = doc_idx {
            corpus.docs[*doc_idx].embedding_row = Some(row);
        }
    }
    row_to_doc
}

// =============================================================================
// SESSION
// =============================================================================

struct PendingQuery {
    raw: String,
    deadline: Instant,
    generation: u64,
}

struct AppliedResult {
    generation: u64,
    outcome: SearchOutcome,
}

/// Interactive wrapper: debounced keystrokes, generation-guarded results.
///
/// Time is passed in explicitly (`Instant`) rather than read inside, so
/// the debounce logic is testable without sleeping.
pub struct SearchSession {
    engine: Arc<SearchEngine>,
    debounce: Duration,
    /// Latest generation handed out by `keystroke`.
    newest: AtomicU64,
    pending: Option<PendingQuery>,
    current: Mutex<Option<AppliedResult>>,
}

impl SearchSession {
    pub fn new(engine: Arc<SearchEngine>) -> Self {
        Self::with_debounce(engine, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(engine: Arc<SearchEngine>, debounce: Duration) -> Self {
        SearchSession {
            engine,
            debounce,
            newest: AtomicU64::new(0),
            pending: None,
            current: Mutex::new(None),
        }
    }

    /// Register an input change. Any pending query is superseded; the new
    /// one becomes runnable `debounce` after `now`. Returns the new
    /// generation.
    pub fn keystroke(&mut self, raw: &str, now: Instant) -> u64 {
        let generation = self.newest.fetch_add(1, Ordering::SeqCst) + 1;
        self.pending = Some(PendingQuery {
            raw: raw.to_string(),
            deadline: now + self.debounce,
            generation,
        });
        generation
    }

    /// Execute the pending query if its debounce deadline has passed.
    /// Runs at most one search per call and consumes the pending entry.
    pub fn poll(&mut self, now: Instant) -> Option<(u64, SearchOutcome)> {
        let due = self.pending.as_ref().map_or(false, |p| now >= p.deadline);
        if !due {
            return None;
        }
        let pending = self.pending.take()?;
        let outcome = self.engine.search(&pending.raw);
        if self.try_apply(pending.generation, outcome.clone()) {
            Some((pending.generation, outcome))
        } else {
            None
        }
    }

    /// Install a result unless it has been superseded by a newer
    /// keystroke. Safe to call from a worker thread delivering a late
    /// refinement for the current generation.
    pub fn try_apply(&self, generation: u64, outcome: SearchOutcome) -> bool {
        if generation != self.newest.load(Ordering::SeqCst) {
            return false;
        }
        let mut slot = self.lock_current();
        *slot = Some(AppliedResult {
            generation,
            outcome,
        });
        true
    }

    /// The last applied outcome, if any.
    pub fn current(&self) -> Option<SearchOutcome> {
        self.lock_current()
            .as_ref()
            .map(|applied| applied.outcome.clone())
    }

    /// Generation of the last applied outcome.
    pub fn current_generation(&self) -> Option<u64> {
        self.lock_current().as_ref().map(|applied| applied.generation)
    }

    #[cfg(feature = "parallel")]
    fn lock_current(&self) -> parking_lot::MutexGuard<'_, Option<AppliedResult>> {
        self.current.lock()
    }

    #[cfg(not(feature = "parallel"))]
    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<AppliedResult>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CatalogEntry;
    use crate::vector::EmbeddingEncoding;

    fn package(name: &str, description: &str, score: f64) -> CatalogEntry {
        CatalogEntry::Package {
            name: name.to_string(),
            description: description.to_string(),
            category: "inference".to_string(),
            url: String::new(),
            tags: vec![],
            language: None,
            best_for: None,
            model_score: score,
            questions: vec![],
        }
    }

    fn corpus() -> Corpus {
        Corpus::load(&[
            package("Causal Forests", "heterogeneous treatment effects", 0.4),
            package("DoWhy", "causal inference framework", 0.8),
            package("EconML", "machine learning based estimation", 0.2),
        ])
        .unwrap()
    }

    fn engine_without_vectors() -> SearchEngine {
        SearchEngine::new(corpus(), None, EngineConfig::default()).unwrap()
    }

    fn f32_blob(rows: &[Vec<f32>]) -> Vec<u8> {
        rows.iter()
            .flatten()
            .flat_map(|x| x.to_le_bytes())
            .collect()
    }

    #[test]
    fn lexical_only_engine_still_searches() {
        let engine = engine_without_vectors();
        assert!(!engine.vector_available());
        let outcome = engine.search("causal");
        assert!(!outcome.candidates.is_empty());
        assert!(outcome.candidates.iter().all(|c| c.vector_similarity.is_none()));
    }

    #[test]
    fn filter_only_query_lists_by_popularity() {
        let engine = engine_without_vectors();
        let outcome = engine.search("type:package");
        assert_eq!(outcome.candidates.len(), 3);
        // DoWhy has the highest model score
        assert_eq!(outcome.candidates[0].doc_idx, 1);
        assert!(outcome.candidates[0].boosts.contains(&crate::types::BoostTag::Popularity));
    }

    #[test]
    fn empty_query_yields_empty_outcome() {
        let engine = engine_without_vectors();
        assert!(engine.search("   ").candidates.is_empty());
    }

    #[test]
    fn broken_embeddings_degrade_to_unavailable() {
        let metadata = EmbeddingMetadata {
            model: "test".to_string(),
            dimensions: 4,
            count: 3,
            encoding: EmbeddingEncoding::F32le,
            ids: vec![
                "package-causal-forests".to_string(),
                "package-dowhy".to_string(),
                "package-econml".to_string(),
            ],
        };
        let engine = SearchEngine::new(
            corpus(),
            Some(EmbeddingAsset {
                blob: &[0u8; 3], // wrong size
                metadata,
            }),
            EngineConfig::default(),
        )
        .unwrap();
        assert!(!engine.vector_available());
        assert!(matches!(
            engine.vector_error(),
            Some(VectorLoadError::SizeMismatch { .. })
        ));
        // still searches
        assert!(!engine.search("causal").candidates.is_empty());
    }

    #[test]
    fn vector_path_contributes_similarities() {
        let rows = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.9, 0.1, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        let metadata = EmbeddingMetadata {
            model: "test".to_string(),
            dimensions: 3,
            count: 3,
            encoding: EmbeddingEncoding::F32le,
            ids: vec![
                "package-causal-forests".to_string(),
                "package-dowhy".to_string(),
                "package-econml".to_string(),
            ],
        };
        let blob = f32_blob(&rows);
        let engine = SearchEngine::new(
            corpus(),
            Some(EmbeddingAsset {
                blob: &blob,
                metadata,
            }),
            EngineConfig::default(),
        )
        .unwrap();
        assert!(engine.vector_available());
        let outcome = engine.search("causal");
        assert!(outcome
            .candidates
            .iter()
            .any(|c| c.vector_similarity.is_some()));
    }

    #[test]
    fn debounce_defers_execution() {
        let engine = Arc::new(engine_without_vectors());
        let mut session = SearchSession::new(engine);
        let t0 = Instant::now();
        session.keystroke("causal", t0);
        assert!(session.poll(t0).is_none());
        assert!(session.poll(t0 + Duration::from_millis(100)).is_none());
        let (generation, outcome) = session.poll(t0 + Duration::from_millis(150)).unwrap();
        assert_eq!(generation, 1);
        assert!(!outcome.candidates.is_empty());
        // consumed: a second poll does nothing
        assert!(session.poll(t0 + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn rapid_keystrokes_supersede() {
        let engine = Arc::new(engine_without_vectors());
        let mut session = SearchSession::new(engine);
        let t0 = Instant::now();
        session.keystroke("c", t0);
        session.keystroke("ca", t0 + Duration::from_millis(50));
        session.keystroke("causal", t0 + Duration::from_millis(100));
        // earlier deadlines passed, but only the newest query remains
        let (generation, _) = session.poll(t0 + Duration::from_millis(250)).unwrap();
        assert_eq!(generation, 3);
        assert_eq!(session.current_generation(), Some(3));
    }

    #[test]
    fn stale_results_are_rejected() {
        let engine = Arc::new(engine_without_vectors());
        let mut session = SearchSession::new(engine.clone());
        let t0 = Instant::now();
        let old = session.keystroke("causal", t0);
        session.keystroke("dowhy", t0 + Duration::from_millis(10));

        let stale = engine.search("causal");
        assert!(!session.try_apply(old, stale));
        assert!(session.current().is_none());

        let (generation, _) = session.poll(t0 + Duration::from_secs(1)).unwrap();
        assert_eq!(generation, 2);
        assert_eq!(session.current_generation(), Some(2));
    }
}
