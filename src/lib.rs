//! Hybrid lexical + vector search over a static content catalog.
//!
//! This crate ranks a frozen corpus of catalog entries (packages, papers,
//! datasets, talks, ...) against interactive queries by fusing two
//! independent matchers: a field-weighted typo-tolerant lexical matcher
//! and a dot-product matcher over precomputed embeddings.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  query.rs   │     │  lexical.rs  │     │  vector.rs  │
//! │ (parse,     │     │ (LexicalIndex│     │ (VectorIndex│
//! │  filters)   │     │  fuzzy score)│     │  dot product)│
//! └──────┬──────┘     └──────┬───────┘     └──────┬──────┘
//!        │                   └────────┬───────────┘
//!        │                            ▼
//!        │                     ┌─────────────┐
//!        └────────────────────▶│  fusion.rs  │
//!                              │ (RRF + boosts)
//!                              └──────┬──────┘
//!                                     ▼
//!                              ┌─────────────┐
//!                              │  engine.rs  │
//!                              │ (SearchEngine,
//!                              │  SearchSession)
//!                              └─────────────┘
//! ```
//!
//! `types.rs` defines the corpus model, `cache.rs` the checksummed asset
//! persistence, `levenshtein.rs` and `utils.rs` the shared primitives.
//!
//! # Guarantees
//!
//! | Property        | Rule                                              |
//! |-----------------|---------------------------------------------------|
//! | Determinism     | identical corpus + query ⇒ identical ordering     |
//! | Degradation     | broken embeddings ⇒ lexical-only, never an error  |
//! | Score range     | lexical scores in [0, 1], lower = better          |
//! | Staleness       | superseded search generations are never applied   |
//!
//! # Usage
//!
//! ```ignore
//! use quarry::{Corpus, EngineConfig, SearchEngine};
//!
//! let corpus = Corpus::load(&entries)?;
//! let engine = SearchEngine::new(corpus, None, EngineConfig::default())?;
//! let outcome = engine.search("causal inference tutorial type:resource");
//! ```

pub mod cache;
mod engine;
mod fusion;
mod levenshtein;
mod lexical;
mod query;
mod types;
mod utils;
mod vector;

pub use engine::{
    EmbeddingAsset, EngineConfig, SearchEngine, SearchOutcome, SearchSession, DEFAULT_DEBOUNCE,
};
pub use fusion::{detect_intent, fuse, BoostConfig, Intent, VectorRanked};
pub use levenshtein::{bounded_levenshtein, levenshtein_within};
pub use lexical::{FieldWeights, LexicalHit, LexicalIndex, WeightError};
pub use query::{describe, matches_filters, parse, ParsedQuery};
pub use types::{
    project_entry, slugify, BoostTag, CatalogEntry, ContentKind, Corpus, CorpusError, Document,
    ScoredCandidate, SidePayload,
};
pub use utils::{normalize, tokenize};
pub use vector::{
    dot, l2_normalize, EmbeddingEncoding, EmbeddingMetadata, VectorHit, VectorIndex,
    VectorLoadError,
};
