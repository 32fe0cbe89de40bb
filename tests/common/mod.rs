//! Shared fixtures for the integration tests.

use quarry::{CatalogEntry, Corpus, EngineConfig, SearchEngine};

pub fn package(name: &str, description: &str, tags: &[&str], score: f64) -> CatalogEntry {
    CatalogEntry::Package {
        name: name.to_string(),
        description: description.to_string(),
        category: "causal-inference".to_string(),
        url: format!("https://example.org/{}", name.to_lowercase().replace(' ', "-")),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        language: Some("python".to_string()),
        best_for: None,
        model_score: score,
        questions: vec![],
    }
}

pub fn paper(title: &str, summary: &str, authors: &[&str], year: u16) -> CatalogEntry {
    CatalogEntry::Paper {
        title: title.to_string(),
        summary: summary.to_string(),
        category: "methods".to_string(),
        url: String::new(),
        tags: vec![],
        authors: authors.iter().map(|a| a.to_string()).collect(),
        year: Some(year),
        venue: None,
        model_score: 0.0,
        questions: vec![],
    }
}

pub fn resource(name: &str, description: &str) -> CatalogEntry {
    CatalogEntry::Resource {
        name: name.to_string(),
        description: description.to_string(),
        category: "learning".to_string(),
        url: String::new(),
        tags: vec![],
        audience: Some("beginner".to_string()),
        model_score: 0.0,
        questions: vec![],
    }
}

pub fn engine(entries: &[CatalogEntry]) -> SearchEngine {
    let corpus = Corpus::load(entries).unwrap();
    SearchEngine::new(corpus, None, EngineConfig::default()).unwrap()
}

/// Document names of an outcome, in rank order.
pub fn names(engine: &SearchEngine, outcome: &quarry::SearchOutcome) -> Vec<String> {
    outcome
        .candidates
        .iter()
        .map(|c| engine.corpus().docs[c.doc_idx].name.clone())
        .collect()
}
