// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Field-weighted, typo-tolerant lexical matching.
//!
//! The index is token lists per field per document, built once from the
//! frozen corpus. Scores are *costs*: lower = better, bounded [0, 1].
//!
//! # Matching policy (deterministic by construction)
//!
//! For each query token (minimum 2 chars - shorter never matches):
//!
//! | Match kind              | Raw cost                    | Distance |
//! |-------------------------|-----------------------------|----------|
//! | Exact token             | 0.0                         | 0        |
//! | Substring containment   | 0.1                         | 0        |
//! | Edit distance d         | d / max(len(q), len(t))     | d        |
//!
//! Allowed edit distance: 1 for query tokens of ≤ 5 chars, 2 otherwise.
//! The per-field contribution is `(raw + 0.01) / field_weight`, so a match
//! in a heavily weighted field (name) costs less than the same match in
//! category, and exact matches still order by field. A document's score
//! averages its per-token bests; tokens with no match anywhere count 1.0.
//! Documents where no token matches at all are omitted.
//!
//! Ties break by document position ascending, so a given index and query
//! always produce the same ordering.

use std::cmp::Ordering;
use std::fmt;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::levenshtein::bounded_levenshtein;
use crate::types::Corpus;
use crate::utils::{normalize, tokenize};

/// Base cost added before the weight discount, so exact matches in
/// different fields still order by field weight.
const FIELD_BASE_COST: f64 = 0.01;

/// Substring containment cost (worse than exact, better than any edit).
const SUBSTRING_COST: f64 = 0.1;

/// Query tokens shorter than this never trigger a match.
const MIN_TOKEN_LEN: usize = 2;

/// Maximum edit distance for a query token.
fn max_distance(query_len: usize) -> usize {
    if query_len > 5 {
        2
    } else {
        1
    }
}

// =============================================================================
// FIELD WEIGHTS
// =============================================================================

/// Per-field importance multipliers. Higher weight = cheaper match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldWeights {
    pub name: f64,
    pub tags: f64,
    pub description: f64,
    pub category: f64,
}

impl Default for FieldWeights {
    /// Name weighted highest, then tags, description, category.
    fn default() -> Self {
        FieldWeights {
            name: 3.0,
            tags: 2.0,
            description: 1.5,
            category: 1.0,
        }
    }
}

impl FieldWeights {
    fn as_array(&self) -> [f64; 4] {
        [self.name, self.tags, self.description, self.category]
    }

    /// All weights must be finite and >= 1.0, otherwise the [0, 1] score
    /// bound breaks. This is the construction-time misconfiguration the
    /// engine is allowed to fail fast on.
    pub fn validate(&self) -> Result<(), WeightError> {
        for (idx, w) in self.as_array().into_iter().enumerate() {
            if !w.is_finite() || w < 1.0 {
                return Err(WeightError {
                    field: FIELD_NAMES[idx],
                    weight: w,
                });
            }
        }
        Ok(())
    }
}

const FIELD_NAMES: [&str; 4] = ["name", "tags", "description", "category"];

/// Invalid field-weight configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightError {
    pub field: &'static str,
    pub weight: f64,
}

impl fmt::Display for WeightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field weight for '{}' must be finite and >= 1.0, got {}",
            self.field, self.weight
        )
    }
}

impl std::error::Error for WeightError {}

// =============================================================================
// INDEX
// =============================================================================

/// Token lists for one document, one list per weighted field.
#[derive(Debug, Clone)]
struct DocTokens {
    /// Order matches `FIELD_NAMES`: name, tags, description, category.
    fields: [Vec<String>; 4],
}

/// The immutable lexical index.
pub struct LexicalIndex {
    weights: FieldWeights,
    docs: Vec<DocTokens>,
}

/// One lexical hit. Lower `score` = better match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalHit {
    /// Position into the corpus this index was built from.
    pub doc_idx: usize,
    /// Cost in [0, 1].
    pub score: f64,
    /// Best edit distance across matched tokens (0 = exact or substring).
    pub best_distance: u32,
}

impl LexicalIndex {
    /// Build the index. Immutable once built; rebuilt only when the corpus
    /// version changes.
    pub fn build(corpus: &Corpus, weights: FieldWeights) -> Result<Self, WeightError> {
        weights.validate()?;

        let docs = corpus
            .docs
            .iter()
            .map(|doc| DocTokens {
                fields: [
                    tokenize(&normalize(&doc.name)),
                    tokenize(&normalize(&doc.tags.join(" "))),
                    tokenize(&normalize(&doc.description)),
                    tokenize(&normalize(&doc.category)),
                ],
            })
            .collect();

        Ok(LexicalIndex { weights, docs })
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Search the index with an already-clean query (no filters, no
    /// negations - the parser strips those before anything reaches here).
    ///
    /// Returns hits ascending by score. Empty corpus or empty query →
    /// empty result, never an error.
    pub fn search(&self, clean_query: &str) -> Vec<LexicalHit> {
        let query_tokens: Vec<String> = tokenize(&normalize(clean_query))
            .into_iter()
            .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
            .collect();

        if query_tokens.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        #[cfg(feature = "parallel")]
        let iter = self.docs.par_iter().enumerate();
        #[cfg(not(feature = "parallel"))]
        let iter = self.docs.iter().enumerate();

        let mut hits: Vec<LexicalHit> = iter
            .filter_map(|(doc_idx, doc)| self.score_doc(doc_idx, doc, &query_tokens))
            .collect();

        hits.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(Ordering::Equal)
                .then(a.doc_idx.cmp(&b.doc_idx))
        });
        hits
    }

    /// Score one document against the query tokens, or None if nothing
    /// matched.
    fn score_doc(
        &self,
        doc_idx: usize,
        doc: &DocTokens,
        query_tokens: &[String],
    ) -> Option<LexicalHit> {
        let weights = self.weights.as_array();
        let mut total = 0.0;
        let mut matched_any = false;
        let mut best_distance = u32::MAX;

        for q in query_tokens {
            let mut token_best: Option<(f64, u32)> = None;

            for (field_idx, tokens) in doc.fields.iter().enumerate() {
                for t in tokens {
                    let Some((raw, dist)) = match_token(q, t) else {
                        continue;
                    };
                    let cost = (raw + FIELD_BASE_COST) / weights[field_idx];
                    if token_best.map(|(c, _)| cost < c).unwrap_or(true) {
                        token_best = Some((cost, dist));
                    }
                }
            }

            match token_best {
                Some((cost, dist)) => {
                    total += cost;
                    matched_any = true;
                    best_distance = best_distance.min(dist);
                }
                None => total += 1.0,
            }
        }

        if !matched_any {
            return None;
        }

        Some(LexicalHit {
            doc_idx,
            score: total / query_tokens.len() as f64,
            best_distance,
        })
    }
}

/// Match one query token against one document token under the policy table.
fn match_token(q: &str, t: &str) -> Option<(f64, u32)> {
    if q == t {
        return Some((0.0, 0));
    }
    if t.contains(q) {
        return Some((SUBSTRING_COST, 0));
    }
    let q_len = q.chars().count();
    let d = bounded_levenshtein(q, t, max_distance(q_len))?;
    let t_len = t.chars().count();
    let raw = d as f64 / q_len.max(t_len) as f64;
    Some((raw, d as u32))
}
