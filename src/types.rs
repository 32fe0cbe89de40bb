// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The corpus model: catalog entries, the common document projection, and
//! scored candidates.
//!
//! The catalog is heterogeneous on disk - talks have speakers, papers have
//! authors and years, packages have languages. Rather than forcing one schema
//! on the data files, each content type keeps its own shape (`CatalogEntry`)
//! and a normalization adapter projects every variant into the one `Document`
//! shape the matchers index. Type-specific extras survive in a side payload
//! keyed by id, so the renderer can still show "PyData 2023" on a talk card.
//!
//! # Invariants
//!
//! - **Corpus**: read-only after `Corpus::load`. Documents are indexed by
//!   position; `Document::id` strings are unique within one corpus.
//! - **Embedding row**: `embedding_row` is either `None` or a valid row index
//!   into the embedding matrix loaded alongside this corpus.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::normalize;

// =============================================================================
// CONTENT KINDS
// =============================================================================

/// Content type of a catalog entry.
///
/// Mirrors the per-type data files the catalog is built from
/// (`packages.json`, `talks.json`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Package,
    Dataset,
    Resource,
    Talk,
    Career,
    Community,
    Paper,
    Roadmap,
    Book,
}

impl ContentKind {
    /// Lowercase string form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Package => "package",
            ContentKind::Dataset => "dataset",
            ContentKind::Resource => "resource",
            ContentKind::Talk => "talk",
            ContentKind::Career => "career",
            ContentKind::Community => "community",
            ContentKind::Paper => "paper",
            ContentKind::Roadmap => "roadmap",
            ContentKind::Book => "book",
        }
    }

    /// Parse a lowercase kind name. Used by the `type:` query filter.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "package" => Some(ContentKind::Package),
            "dataset" => Some(ContentKind::Dataset),
            "resource" => Some(ContentKind::Resource),
            "talk" => Some(ContentKind::Talk),
            "career" => Some(ContentKind::Career),
            "community" => Some(ContentKind::Community),
            "paper" => Some(ContentKind::Paper),
            "roadmap" => Some(ContentKind::Roadmap),
            "book" => Some(ContentKind::Book),
            _ => None,
        }
    }
}

// =============================================================================
// CATALOG ENTRIES (heterogeneous on-disk shapes)
// =============================================================================

/// A raw catalog entry as it appears in the data files.
///
/// Tagged by content type. Only the fields the engine cares about are listed
/// per variant; everything else in the JSON is ignored by serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CatalogEntry {
    Package {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        category: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        best_for: Option<String>,
        #[serde(default)]
        model_score: f64,
        #[serde(default)]
        questions: Vec<String>,
    },
    Dataset {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        category: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        model_score: f64,
        #[serde(default)]
        questions: Vec<String>,
    },
    Resource {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        category: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        audience: Option<String>,
        #[serde(default)]
        model_score: f64,
        #[serde(default)]
        questions: Vec<String>,
    },
    Talk {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        category: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        speaker: Option<String>,
        #[serde(default)]
        event: Option<String>,
        #[serde(default)]
        year: Option<u16>,
        #[serde(default)]
        model_score: f64,
        #[serde(default)]
        questions: Vec<String>,
    },
    Career {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        category: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        audience: Option<String>,
        #[serde(default)]
        model_score: f64,
        #[serde(default)]
        questions: Vec<String>,
    },
    Community {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        category: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        model_score: f64,
        #[serde(default)]
        questions: Vec<String>,
    },
    Paper {
        /// Papers use `title` in the data files, not `name`.
        title: String,
        #[serde(default)]
        summary: String,
        #[serde(default)]
        category: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        authors: Vec<String>,
        #[serde(default)]
        year: Option<u16>,
        #[serde(default)]
        venue: Option<String>,
        #[serde(default)]
        model_score: f64,
        #[serde(default)]
        questions: Vec<String>,
    },
    Roadmap {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        category: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        audience: Option<String>,
        #[serde(default)]
        model_score: f64,
        #[serde(default)]
        questions: Vec<String>,
    },
    Book {
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        category: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        authors: Vec<String>,
        #[serde(default)]
        year: Option<u16>,
        #[serde(default)]
        model_score: f64,
        #[serde(default)]
        questions: Vec<String>,
    },
}

impl CatalogEntry {
    /// Content kind of this entry.
    pub fn kind(&self) -> ContentKind {
        match self {
            CatalogEntry::Package { .. } => ContentKind::Package,
            CatalogEntry::Dataset { .. } => ContentKind::Dataset,
            CatalogEntry::Resource { .. } => ContentKind::Resource,
            CatalogEntry::Talk { .. } => ContentKind::Talk,
            CatalogEntry::Career { .. } => ContentKind::Career,
            CatalogEntry::Community { .. } => ContentKind::Community,
            CatalogEntry::Paper { .. } => ContentKind::Paper,
            CatalogEntry::Roadmap { .. } => ContentKind::Roadmap,
            CatalogEntry::Book { .. } => ContentKind::Book,
        }
    }
}

// =============================================================================
// THE COMMON PROJECTION
// =============================================================================

/// The one document shape every matcher indexes.
///
/// Produced from a `CatalogEntry` by the normalization adapter. `authors` and
/// `year` exist so the `author:`/`year:` query filters have something to
/// match; `audience` feeds the intent boost in fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Unique within the corpus: `"{kind}-{slug}"`.
    pub id: String,
    pub kind: ContentKind,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub url: String,
    /// Author/speaker names, lowercased for filter matching.
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<u16>,
    /// Audience tag: "beginner", "practitioner", "researcher", ...
    #[serde(default)]
    pub audience: Option<String>,
    /// Externally injected popularity score in [0, 1] (ALS model output).
    #[serde(default)]
    pub model_score: f64,
    /// Precomputed natural-language questions this entry answers.
    #[serde(default)]
    pub questions: Vec<String>,
    /// Row into the embedding matrix, assigned when embeddings load.
    /// None means this document participates in lexical ranking only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_row: Option<usize>,
}

impl Document {
    /// Concatenation of all searchable text fields, normalized.
    ///
    /// This is the haystack for phrase and negation matching. Field order
    /// matches indexing order: name, tags, description, category, authors.
    pub fn searchable_text(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(5);
        parts.push(normalize(&self.name));
        if !self.tags.is_empty() {
            parts.push(normalize(&self.tags.join(" ")));
        }
        if !self.description.is_empty() {
            parts.push(normalize(&self.description));
        }
        if !self.category.is_empty() {
            parts.push(normalize(&self.category));
        }
        if !self.authors.is_empty() {
            parts.push(normalize(&self.authors.join(" ")));
        }
        parts.retain(|p| !p.is_empty());
        parts.join(" ")
    }
}

/// Type-specific fields that don't fit the common projection.
///
/// Keyed by document id in the corpus; the renderer reads these, the
/// matchers never do.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_for: Option<String>,
}

/// Slugify a display name into the id tail: lowercase, spaces and slashes
/// become hyphens, capped at 100 chars (same rule the asset pipeline uses).
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '/' { '-' } else { c })
        .take(100)
        .collect()
}

/// Project a raw catalog entry into the common document shape plus its
/// side payload.
pub fn project_entry(entry: &CatalogEntry) -> (Document, SidePayload) {
    let kind = entry.kind();
    let mut side = SidePayload::default();

    let (name, description, category, url, tags, authors, year, audience, model_score, questions) =
        match entry {
            CatalogEntry::Package {
                name,
                description,
                category,
                url,
                tags,
                language,
                best_for,
                model_score,
                questions,
            } => {
                side.language = language.clone();
                side.best_for = best_for.clone();
                #[rustfmt::skip]
                let row = (name, description, category, url, tags,
                           Vec::new(), None, None, *model_score, questions);
                row
            }
            CatalogEntry::Dataset {
                name,
                description,
                category,
                url,
                tags,
                model_score,
                questions,
            } => (
                name, description, category, url, tags,
                Vec::new(), None, None, *model_score, questions,
            ),
            CatalogEntry::Resource {
                name,
                description,
                category,
                url,
                tags,
                audience,
                model_score,
                questions,
            } => (
                name, description, category, url, tags,
                Vec::new(), None, audience.clone(), *model_score, questions,
            ),
            CatalogEntry::Talk {
                name,
                description,
                category,
                url,
                tags,
                speaker,
                event,
                year,
                model_score,
                questions,
            } => {
                side.event = event.clone();
                let authors: Vec<String> = speaker.iter().map(|s| s.to_lowercase()).collect();
                (
                    name, description, category, url, tags,
                    authors, *year, None, *model_score, questions,
                )
            }
            CatalogEntry::Career {
                name,
                description,
                category,
                url,
                tags,
                audience,
                model_score,
                questions,
            } => (
                name, description, category, url, tags,
                Vec::new(), None, audience.clone(), *model_score, questions,
            ),
            CatalogEntry::Community {
                name,
                description,
                category,
                url,
                tags,
                model_score,
                questions,
            } => (
                name, description, category, url, tags,
                Vec::new(), None, None, *model_score, questions,
            ),
            CatalogEntry::Paper {
                title,
                summary,
                category,
                url,
                tags,
                authors,
                year,
                venue,
                model_score,
                questions,
            } => {
                side.venue = venue.clone();
                let authors: Vec<String> = authors.iter().map(|a| a.to_lowercase()).collect();
                (
                    title, summary, category, url, tags,
                    authors, *year, None, *model_score, questions,
                )
            }
            CatalogEntry::Roadmap {
                name,
                description,
                category,
                url,
                tags,
                audience,
                model_score,
                questions,
            } => (
                name, description, category, url, tags,
                Vec::new(), None, audience.clone(), *model_score, questions,
            ),
            CatalogEntry::Book {
                title,
                description,
                category,
                url,
                tags,
                authors,
                year,
                model_score,
                questions,
            } => {
                let authors: Vec<String> = authors.iter().map(|a| a.to_lowercase()).collect();
                (
                    title, description, category, url, tags,
                    authors, *year, None, *model_score, questions,
                )
            }
        };

    let doc = Document {
        id: format!("{}-{}", kind.as_str(), slugify(name)),
        kind,
        name: name.clone(),
        description: description.clone(),
        tags: tags.clone(),
        category: category.clone(),
        url: url.clone(),
        authors,
        year,
        audience,
        model_score,
        questions: questions.clone(),
        embedding_row: None,
    };

    (doc, side)
}

// =============================================================================
// CORPUS
// =============================================================================

/// The frozen document corpus.
///
/// Built once per catalog version, never mutated afterwards. Readers share it
/// behind an `Arc` without synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Corpus {
    pub docs: Vec<Document>,
    /// Side payloads keyed by document id.
    pub payloads: HashMap<String, SidePayload>,
}

impl Corpus {
    /// Load a corpus from raw catalog entries.
    ///
    /// Duplicate ids are a catalog bug; construction fails fast on them
    /// rather than letting two documents shadow each other in the index.
    pub fn load(entries: &[CatalogEntry]) -> Result<Self, CorpusError> {
        let mut docs = Vec::with_capacity(entries.len());
        let mut payloads = HashMap::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (pos, entry) in entries.iter().enumerate() {
            let (doc, side) = project_entry(entry);
            if let Some(&first) = seen.get(&doc.id) {
                return Err(CorpusError::DuplicateId {
                    id: doc.id,
                    first,
                    second: pos,
                });
            }
            seen.insert(doc.id.clone(), pos);
            payloads.insert(doc.id.clone(), side);
            docs.push(doc);
        }

        Ok(Corpus { docs, payloads })
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Look up a document by its position.
    pub fn doc(&self, idx: usize) -> Option<&Document> {
        self.docs.get(idx)
    }
}

/// Construction-time corpus errors. The only place the engine fails fast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusError {
    /// Two entries projected to the same document id.
    DuplicateId {
        id: String,
        first: usize,
        second: usize,
    },
}

impl fmt::Display for CorpusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorpusError::DuplicateId { id, first, second } => {
                write!(
                    f,
                    "duplicate document id '{}' (entries {} and {})",
                    id, first, second
                )
            }
        }
    }
}

impl std::error::Error for CorpusError {}

// =============================================================================
// SCORED CANDIDATES
// =============================================================================

/// A boost applied during fusion, kept for explainability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoostTag {
    /// Exact lexical match amplified, vector damped.
    StrongLexical,
    /// High vector similarity amplified.
    StrongVector,
    /// Query intent aligned with document kind/audience.
    IntentAligned,
    /// Query intent clearly mismatched.
    IntentMismatch,
    /// Popularity (model score) blended in.
    Popularity,
    /// Clean query matched a precomputed question.
    QuestionMatch,
}

/// One fused search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    /// Position into `Corpus::docs`.
    pub doc_idx: usize,
    /// Lexical score in [0, 1], lower = better. None if lexical missed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_score: Option<f64>,
    /// Best edit distance behind the lexical score (0 = exact/substring).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_distance: Option<u32>,
    /// Cosine similarity. None if the vector path missed or is unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_similarity: Option<f32>,
    /// Final fused score, higher = better.
    pub fused_score: f64,
    /// Boosts applied, in application order.
    pub boosts: Vec<BoostTag>,
}
