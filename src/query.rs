// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Structured query parsing: phrases, field filters, negations, free terms.
//!
//! `parse` never fails. Whatever the user typed, the worst outcome is the
//! empty `ParsedQuery`, which matches everything downstream.
//!
//! Extraction proceeds in a fixed order, each step consuming the text it
//! matched so later steps can't double-count it:
//!
//! 1. Quoted phrases, optionally negated (`-"exact phrase"`)
//! 2. `field:value` tokens, field names folded through the alias table
//! 3. Negated single tokens (`-word`), case-folded, length > 1
//! 4. Remaining tokens become free terms, case-folded
//! 5. `clean_query` = free terms ++ phrases, space-joined
//!
//! The clean query is what reaches the fuzzy and semantic matchers -
//! filters and negations never leak into it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::types::{ContentKind, Document};
use crate::utils::normalize;

/// Canonical filter field names after alias folding.
pub const FILTER_FIELDS: [&str; 4] = ["author", "year", "topic", "type"];

/// Fold a field prefix through the alias table.
///
/// Returns None for unrecognized prefixes; the caller leaves those tokens
/// as ordinary text.
fn canonical_field(field: &str) -> Option<&'static str> {
    match field {
        "author" | "authors" | "by" | "writer" => Some("author"),
        "year" | "date" | "published" | "yr" => Some("year"),
        "topic" | "area" | "field" | "domain" => Some("topic"),
        "type" | "kind" | "category" => Some("type"),
        _ => None,
    }
}

/// A raw query string decomposed into structure.
///
/// # Invariants
///
/// - Filter keys are canonical names from the alias table.
/// - `clean_query` contains only free terms and phrases, normalized.
/// - Parsing empty/blank input yields the all-empty structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedQuery {
    /// Free terms in input order, case-folded.
    pub terms: Vec<String>,
    /// Quoted phrases, case-folded, input order.
    pub phrases: Vec<String>,
    /// field → values. AND across fields, OR within a field.
    pub filters: BTreeMap<String, BTreeSet<String>>,
    /// Negated single tokens.
    pub negated_terms: BTreeSet<String>,
    /// Negated phrases.
    pub negated_phrases: BTreeSet<String>,
    /// Terms ++ phrases, space-joined. What the matchers see.
    pub clean_query: String,
}

impl ParsedQuery {
    /// True when nothing at all was extracted.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
            && self.phrases.is_empty()
            && self.filters.is_empty()
            && self.negated_terms.is_empty()
            && self.negated_phrases.is_empty()
    }
}

/// Parse a raw query string. Never fails; blank input → empty structure.
pub fn parse(raw: &str) -> ParsedQuery {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ParsedQuery::default();
    }

    // Step 1: peel off quoted phrases (and their negations).
    let (rest, phrases, negated_phrases) = extract_phrases(trimmed);

    let mut terms = Vec::new();
    let mut filters: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut negated_terms = BTreeSet::new();

    for token in rest.split_whitespace() {
        // Step 2: field:value tokens.
        if let Some((field, value)) = token.split_once(':') {
            if let Some(canon) = canonical_field(&field.to_lowercase()) {
                let value = normalize(value);
                if !value.is_empty() {
                    filters.entry(canon.to_string()).or_default().insert(value);
                }
                continue;
            }
            // Unknown prefix: fall through, the whole token is ordinary text.
        }

        // Step 3: negated tokens. Single-letter negations are ignored.
        if let Some(neg) = token.strip_prefix('-') {
            let neg = normalize(neg);
            if neg.chars().count() > 1 {
                negated_terms.insert(neg);
            }
            continue;
        }

        // Step 4: free terms.
        let term = normalize(token);
        if !term.is_empty() {
            terms.push(term);
        }
    }

    // Step 5: the clean query.
    let mut clean_parts: Vec<&str> = terms.iter().map(String::as_str).collect();
    clean_parts.extend(phrases.iter().map(String::as_str));
    let clean_query = clean_parts.join(" ");

    ParsedQuery {
        terms,
        phrases,
        filters,
        negated_terms,
        negated_phrases,
        clean_query,
    }
}

/// Scan out `"..."` spans. A `-` immediately before the opening quote
/// negates the phrase. An unclosed quote is treated as literal text with
/// the quote character dropped.
fn extract_phrases(input: &str) -> (String, Vec<String>, BTreeSet<String>) {
    let mut rest = String::with_capacity(input.len());
    let mut phrases = Vec::new();
    let mut negated = BTreeSet::new();

    let mut chars = input.chars().peekable();
    let mut pending_minus = false;

    while let Some(c) = chars.next() {
        if c == '-' && matches!(chars.peek(), Some('"')) {
            pending_minus = true;
            continue;
        }
        if c == '"' {
            let mut phrase = String::new();
            let mut closed = false;
            for pc in chars.by_ref() {
                if pc == '"' {
                    closed = true;
                    break;
                }
                phrase.push(pc);
            }
            if closed {
                let phrase = normalize(&phrase);
                if !phrase.is_empty() {
                    if pending_minus {
                        negated.insert(phrase);
                    } else {
                        phrases.push(phrase);
                    }
                }
            } else {
                // Unclosed: keep the content as ordinary text.
                if pending_minus {
                    rest.push('-');
                }
                rest.push_str(&phrase);
            }
            pending_minus = false;
            continue;
        }
        pending_minus = false;
        rest.push(c);
    }

    (rest, phrases, negated)
}

// =============================================================================
// FILTER EVALUATION
// =============================================================================

/// Does a single filter value accept this document?
fn filter_value_matches(doc: &Document, field: &str, value: &str) -> bool {
    match field {
        "author" => doc
            .authors
            .iter()
            .any(|a| normalize(a).contains(value)),
        "year" => doc
            .year
            .map(|y| y.to_string() == value)
            .unwrap_or(false),
        "topic" => {
            normalize(&doc.category).contains(value)
                || doc.tags.iter().any(|t| normalize(t).contains(value))
        }
        "type" => {
            // Tolerate plural ("papers" → "paper").
            ContentKind::parse(value)
                .or_else(|| ContentKind::parse(value.trim_end_matches('s')))
                .map(|k| k == doc.kind)
                .unwrap_or(false)
        }
        _ => false,
    }
}

/// Evaluate the parsed query's hard constraints against one document.
///
/// AND across distinct filter fields, OR across the values inside one field.
/// Positive phrases must appear verbatim (case-insensitive substring) in the
/// document's searchable text; any negated term or phrase present there
/// excludes the document. Pure function, no side effects.
pub fn matches_filters(doc: &Document, parsed: &ParsedQuery) -> bool {
    for (field, values) in &parsed.filters {
        let any = values
            .iter()
            .any(|value| filter_value_matches(doc, field, value));
        if !any {
            return false;
        }
    }

    if parsed.phrases.is_empty()
        && parsed.negated_terms.is_empty()
        && parsed.negated_phrases.is_empty()
    {
        return true;
    }

    let haystack = doc.searchable_text();

    for phrase in &parsed.phrases {
        if !haystack.contains(phrase.as_str()) {
            return false;
        }
    }
    for neg in parsed.negated_terms.iter().chain(&parsed.negated_phrases) {
        if haystack.contains(neg.as_str()) {
            return false;
        }
    }

    true
}

/// Human-readable echo of a parsed query for the UI.
///
/// `searching for: causal forests | excluding: deprecated | year: 2023`
pub fn describe(parsed: &ParsedQuery) -> String {
    if parsed.is_empty() {
        return "searching for: everything".to_string();
    }

    let mut out = String::new();

    if !parsed.clean_query.is_empty() {
        let _ = write!(out, "searching for: {}", parsed.clean_query);
    } else {
        out.push_str("searching for: everything");
    }

    let excluded: Vec<&str> = parsed
        .negated_terms
        .iter()
        .chain(&parsed.negated_phrases)
        .map(String::as_str)
        .collect();
    if !excluded.is_empty() {
        let _ = write!(out, " | excluding: {}", excluded.join(", "));
    }

    for (field, values) in &parsed.filters {
        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        let _ = write!(out, " | {}: {}", field, values.join(", "));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CatalogEntry, project_entry};

    fn doc(name: &str, description: &str) -> Document {
        let (doc, _) = project_entry(&CatalogEntry::Resource {
            name: name.to_string(),
            description: description.to_string(),
            category: "Methods".to_string(),
            url: String::new(),
            tags: vec!["regression".to_string()],
            audience: None,
            model_score: 0.0,
            questions: vec![],
        });
        doc
    }

    #[test]
    fn empty_input_parses_to_empty_structure() {
        assert!(parse("").is_empty());
        assert!(parse("   ").is_empty());
        assert_eq!(parse(""), ParsedQuery::default());
    }

    #[test]
    fn free_terms_are_case_folded_in_order() {
        let parsed = parse("Causal FORESTS");
        assert_eq!(parsed.terms, vec!["causal", "forests"]);
        assert_eq!(parsed.clean_query, "causal forests");
    }

    #[test]
    fn phrases_are_extracted_before_terms() {
        let parsed = parse(r#"estimate "difference in differences" panel"#);
        assert_eq!(parsed.phrases, vec!["difference in differences"]);
        assert_eq!(parsed.terms, vec!["estimate", "panel"]);
        assert_eq!(
            parsed.clean_query,
            "estimate panel difference in differences"
        );
    }

    #[test]
    fn negated_phrase_is_not_a_positive_phrase() {
        let parsed = parse(r#"-"legacy api" modern"#);
        assert!(parsed.phrases.is_empty());
        assert!(parsed.negated_phrases.contains("legacy api"));
        assert_eq!(parsed.terms, vec!["modern"]);
    }

    #[test]
    fn field_aliases_normalize() {
        let parsed = parse("by:athey date:2019 domain:causal kind:paper");
        assert!(parsed.filters["author"].contains("athey"));
        assert!(parsed.filters["year"].contains("2019"));
        assert!(parsed.filters["topic"].contains("causal"));
        assert!(parsed.filters["type"].contains("paper"));
        // none of it leaks into the clean query
        assert!(parsed.clean_query.is_empty());
    }

    #[test]
    fn unknown_field_prefix_stays_text() {
        let parsed = parse("url:example causal");
        assert!(parsed.filters.is_empty());
        assert_eq!(parsed.terms, vec!["url:example", "causal"]);
    }

    #[test]
    fn repeated_field_values_accumulate() {
        let parsed = parse("year:2022 year:2023");
        assert_eq!(parsed.filters["year"].len(), 2);
    }

    #[test]
    fn single_letter_negations_are_ignored() {
        let parsed = parse("-x regression");
        assert!(parsed.negated_terms.is_empty());
        assert_eq!(parsed.terms, vec!["regression"]);
    }

    #[test]
    fn negated_terms_are_case_folded() {
        let parsed = parse("-Deprecated regression");
        assert!(parsed.negated_terms.contains("deprecated"));
        assert_eq!(parsed.clean_query, "regression");
    }

    #[test]
    fn unclosed_quote_degrades_to_text() {
        let parsed = parse(r#"causal "forests"#);
        assert!(parsed.phrases.is_empty());
        assert_eq!(parsed.terms, vec!["causal", "forests"]);
    }

    #[test]
    fn reparsing_clean_query_is_stable() {
        let parsed = parse(r#"year:2023 Causal "random forests" -old"#);
        let reparsed = parse(&parsed.clean_query);
        // phrases lose their quotes in the clean query, so they come back
        // as terms; the joined token content is preserved
        assert_eq!(reparsed.clean_query, parsed.clean_query);
        assert!(reparsed.filters.is_empty());
        assert!(reparsed.negated_terms.is_empty());
    }

    #[test]
    fn empty_query_matches_every_document() {
        let d = doc("Causal Forests", "Heterogeneous treatment effects");
        assert!(matches_filters(&d, &ParsedQuery::default()));
    }

    #[test]
    fn year_filter_requires_exact_year() {
        let mut d = doc("Causal Forests", "");
        d.year = Some(2023);
        let parsed = parse("year:2023 causal");
        assert!(matches_filters(&d, &parsed));
        d.year = Some(2020);
        assert!(!matches_filters(&d, &parsed));
    }

    #[test]
    fn or_within_field_and_across_fields() {
        let mut d = doc("Causal Forests", "");
        d.year = Some(2023);
        // OR within year values
        assert!(matches_filters(&d, &parse("year:2020 year:2023")));
        // AND across fields: type mismatch kills it
        assert!(!matches_filters(&d, &parse("year:2023 type:paper")));
        assert!(matches_filters(&d, &parse("year:2023 type:resource")));
    }

    #[test]
    fn positive_phrase_must_appear_verbatim() {
        let with = doc("DiD Guide", "difference in differences estimation");
        let without = doc("Other", "difference and differences separately");
        let parsed = parse(r#""difference in differences""#);
        assert!(matches_filters(&with, &parsed));
        assert!(!matches_filters(&without, &parsed));
    }

    #[test]
    fn negated_term_excludes_document() {
        let d = doc("Old Regression", "deprecated linear regression tool");
        assert!(!matches_filters(&d, &parse("-deprecated regression")));
        let clean = doc("New Regression", "modern linear regression tool");
        assert!(matches_filters(&clean, &parse("-deprecated regression")));
    }

    #[test]
    fn describe_echoes_structure() {
        let parsed = parse(r#"causal -deprecated year:2023"#);
        let echo = describe(&parsed);
        assert!(echo.contains("searching for: causal"));
        assert!(echo.contains("excluding: deprecated"));
        assert!(echo.contains("year: 2023"));
    }
}
