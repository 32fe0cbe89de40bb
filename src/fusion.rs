// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Rank fusion: the join point of the lexical and vector matchers.
//!
//! Fusion never fails and never panics. An empty or unavailable vector
//! list degrades to lexical-only reciprocal rank fusion; an empty lexical
//! list degrades the other way. Both empty means no results, not an error.
//!
//! ## Pipeline
//!
//! | Stage        | Rule                                                   |
//! |--------------|--------------------------------------------------------|
//! | Hard filter  | `matches_filters` on every candidate from either list  |
//! | RRF          | `Σ w / (k + rank)`, k = 60, rank starts at 1           |
//! | Adaptive     | exact lexical hit: lex ×1.5, vec ×0.7; sim ≥ 0.80: vec ×1.3 |
//! | Intent       | detected intent: aligned kind or audience ×1.2, others ×0.85 |
//! | Popularity   | ×(1 + 0.4 · model_score), toggleable                   |
//! | Questions    | +0.2 when the clean query matches a stored question    |
//!
//! Final order is fused score descending, document id ascending on ties,
//! so identical inputs always produce identical output.

use std::cmp::Ordering;

use crate::lexical::LexicalHit;
use crate::levenshtein::levenshtein_within;
use crate::query::{matches_filters, ParsedQuery};
use crate::types::{BoostTag, ContentKind, Corpus, Document, ScoredCandidate};
use crate::utils::normalize;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Tunable fusion knobs. `Default` is the production configuration; tests
/// flip individual fields.
#[derive(Debug, Clone)]
pub struct BoostConfig {
    /// RRF smoothing constant.
    pub rrf_k: f64,
    /// Lexical multiplier when a document has an exact lexical hit.
    pub strong_lexical_boost: f64,
    /// Vector damping applied alongside `strong_lexical_boost`.
    pub strong_lexical_vector_damp: f64,
    /// Similarity at or above which the vector contribution is amplified.
    pub strong_vector_threshold: f32,
    pub strong_vector_boost: f64,
    pub intent_aligned_boost: f64,
    pub intent_mismatch_damp: f64,
    /// Blend the offline model score into the fused score.
    pub popularity_enabled: bool,
    pub popularity_weight: f64,
    /// Flat bonus for matching a precomputed question.
    pub question_bonus: f64,
}

impl Default for BoostConfig {
    fn default() -> Self {
        BoostConfig {
            rrf_k: 60.0,
            strong_lexical_boost: 1.5,
            strong_lexical_vector_damp: 0.7,
            strong_vector_threshold: 0.80,
            strong_vector_boost: 1.3,
            intent_aligned_boost: 1.2,
            intent_mismatch_damp: 0.85,
            popularity_enabled: true,
            popularity_weight: 0.4,
            question_bonus: 0.2,
        }
    }
}

// =============================================================================
// INTENT DETECTION
// =============================================================================

/// Coarse query intent, inferred from free terms and phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// tutorial / how-to / guide / learn
    Learning,
    /// research / paper / study / benchmark
    Research,
    /// install / package / library / tool
    Tooling,
}

impl Intent {
    /// Kinds this intent points at.
    fn aligned_kinds(self) -> &'static [ContentKind] {
        match self {
            Intent::Learning => &[ContentKind::Resource, ContentKind::Talk],
            Intent::Research => &[ContentKind::Paper, ContentKind::Dataset],
            Intent::Tooling => &[ContentKind::Package],
        }
    }

    /// Audience tags this intent points at, matched after normalization.
    fn aligned_audiences(self) -> &'static [&'static str] {
        match self {
            Intent::Learning => &["beginner", "learner", "student"],
            Intent::Research => &["researcher", "academic"],
            Intent::Tooling => &["practitioner", "engineer", "developer"],
        }
    }

    /// A document aligns through its kind or its audience tag. Everything
    /// else gets the mismatch damp.
    pub fn aligns_with(self, doc: &Document) -> bool {
        if self.aligned_kinds().contains(&doc.kind) {
            return true;
        }
        doc.audience
            .as_deref()
            .map_or(false, |audience| {
                self.aligned_audiences().contains(&normalize(audience).as_str())
            })
    }

    fn from_word(word: &str) -> Option<Intent> {
        match word {
            "tutorial" | "tutorials" | "how-to" | "howto" | "guide" | "learn" => {
                Some(Intent::Learning)
            }
            "research" | "paper" | "papers" | "study" | "benchmark" => Some(Intent::Research),
            "install" | "package" | "packages" | "library" | "tool" => Some(Intent::Tooling),
            _ => None,
        }
    }
}

/// First intent word wins; queries rarely carry two intents and when they
/// do the leading one reads as primary.
pub fn detect_intent(parsed: &ParsedQuery) -> Option<Intent> {
    parsed
        .terms
        .iter()
        .chain(parsed.phrases.iter())
        .flat_map(|text| text.split_whitespace())
        .find_map(Intent::from_word)
}

// =============================================================================
// FUSION
// =============================================================================

/// Vector hit already translated from a matrix row to a corpus position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorRanked {
    pub doc_idx: usize,
    pub similarity: f32,
}

struct Slot {
    lexical: Option<(usize, f64, u32)>, // rank, score, best distance
    vector: Option<(usize, f32)>,       // rank, similarity
}

/// Fuse both ranked lists into the final ordering.
pub fn fuse(
    lexical: &[LexicalHit],
    vector: &[VectorRanked],
    parsed: &ParsedQuery,
    config: &BoostConfig,
    corpus: &Corpus,
) -> Vec<ScoredCandidate> {
    let mut slots: Vec<Option<Slot>> = Vec::new();
    slots.resize_with(corpus.docs.len(), || None);

    for (i, hit) in lexical.iter().enumerate() {
        if hit.doc_idx >= slots.len() {
            continue;
        }
        let slot = slots[hit.doc_idx].get_or_insert(Slot {
            lexical: None,
            vector: None,
        });
        slot.lexical = Some((i + 1, hit.score, hit.best_distance));
    }
    for (i, hit) in vector.iter().enumerate() {
        if hit.doc_idx >= slots.len() {
            continue;
        }
        let slot = slots[hit.doc_idx].get_or_insert(Slot {
            lexical: None,
            vector: None,
        });
        slot.vector = Some((i + 1, hit.similarity));
    }

    let intent = detect_intent(parsed);
    let clean = normalize(&parsed.clean_query);

    let mut candidates: Vec<ScoredCandidate> = Vec::new();
    for (doc_idx, slot) in slots.into_iter().enumerate() {
        let Some(slot) = slot else { continue };
        let doc = &corpus.docs[doc_idx];
        if !matches_filters(doc, parsed) {
            continue;
        }

        let mut boosts = Vec::new();

        let mut lex_weight = 1.0;
        let mut vec_weight = 1.0;
        let exact_lexical = matches!(slot.lexical, Some((_, _, 0)));
        if exact_lexical {
            lex_weight *= config.strong_lexical_boost;
            vec_weight *= config.strong_lexical_vector_damp;
            boosts.push(BoostTag::StrongLexical);
        }
        let strong_vector = slot
            .vector
            .map_or(false, |(_, sim)| sim >= config.strong_vector_threshold);
        if strong_vector {
            vec_weight *= config.strong_vector_boost;
            boosts.push(BoostTag::StrongVector);
        }

        let mut fused = 0.0;
        if let Some((rank, _, _)) = slot.lexical {
            fused += lex_weight / (config.rrf_k + rank as f64);
        }
        if let Some((rank, _)) = slot.vector {
            fused += vec_weight / (config.rrf_k + rank as f64);
        }

        if let Some(intent) = intent {
            if intent.aligns_with(doc) {
                fused *= config.intent_aligned_boost;
                boosts.push(BoostTag::IntentAligned);
            } else {
                fused *= config.intent_mismatch_damp;
                boosts.push(BoostTag::IntentMismatch);
            }
        }

        if config.popularity_enabled && doc.model_score > 0.0 {
            fused *= 1.0 + config.popularity_weight * doc.model_score;
            boosts.push(BoostTag::Popularity);
        }

        if !clean.is_empty() && question_match(&clean, &doc.questions) {
            fused += config.question_bonus;
            boosts.push(BoostTag::QuestionMatch);
        }

        candidates.push(ScoredCandidate {
            doc_idx,
            lexical_score: slot.lexical.map(|(_, score, _)| score),
            lexical_distance: slot.lexical.map(|(_, _, dist)| dist),
            vector_similarity: slot.vector.map(|(_, sim)| sim),
            fused_score: fused,
            boosts,
        });
    }

    candidates.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| corpus.docs[a.doc_idx].id.cmp(&corpus.docs[b.doc_idx].id))
    });
    candidates
}

/// A stored question matches when the clean query appears inside it, or
/// the whole strings are within edit distance 2.
fn question_match(clean: &str, questions: &[String]) -> bool {
    questions.iter().any(|q| {
        let q = normalize(q);
        q.contains(clean) || levenshtein_within(&q, clean, 2)
    })
}
