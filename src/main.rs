// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;

use quarry::cache::{
    content_hash, AssetCache, DirBlobStore, EMBEDDINGS_KEY, EMBEDDINGS_METADATA_KEY,
    SEARCH_INDEX_KEY,
};
use quarry::{
    BoostConfig, BoostTag, CatalogEntry, Corpus, EmbeddingAsset, EmbeddingMetadata, EngineConfig,
    SearchEngine,
};

mod cli;
use cli::{Cli, Commands};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug)]
enum CliError {
    Io { path: PathBuf, source: io::Error },
    Json { what: &'static str, source: serde_json::Error },
    Catalog(quarry::CorpusError),
    Weights(quarry::WeightError),
    MissingMetadata,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            CliError::Json { what, source } => write!(f, "invalid {}: {}", what, source),
            CliError::Catalog(e) => write!(f, "catalog error: {}", e),
            CliError::Weights(e) => write!(f, "configuration error: {}", e),
            CliError::MissingMetadata => {
                write!(f, "--embeddings requires --metadata")
            }
        }
    }
}

impl From<quarry::CorpusError> for CliError {
    fn from(e: quarry::CorpusError) -> Self {
        CliError::Catalog(e)
    }
}

impl From<quarry::WeightError> for CliError {
    fn from(e: quarry::WeightError) -> Self {
        CliError::Weights(e)
    }
}

fn read_file(path: &str) -> Result<Vec<u8>, CliError> {
    fs::read(path).map_err(|source| CliError::Io {
        path: Path::new(path).to_path_buf(),
        source,
    })
}

fn load_catalog(path: &str) -> Result<(Vec<u8>, Corpus), CliError> {
    let bytes = read_file(path)?;
    let corpus = project_catalog(&bytes)?;
    Ok((bytes, corpus))
}

fn project_catalog(bytes: &[u8]) -> Result<Corpus, CliError> {
    let entries: Vec<CatalogEntry> =
        serde_json::from_slice(bytes).map_err(|source| CliError::Json {
            what: "catalog",
            source,
        })?;
    Ok(Corpus::load(&entries)?)
}

/// Load the corpus for `search`, preferring the projection `index` cached.
/// The cached copy is only trusted when its content hash matches the raw
/// catalog bytes; otherwise the catalog is re-projected from scratch.
fn load_or_project(bytes: &[u8], cache_dir: &str, catalog_hash: u32) -> Result<Corpus, CliError> {
    let cache = AssetCache::new(DirBlobStore::new(cache_dir));
    if let Some(projected) = cache.get_hashed(SEARCH_INDEX_KEY, catalog_hash) {
        if let Ok(corpus) = serde_json::from_slice::<Corpus>(&projected) {
            return Ok(corpus);
        }
    }
    project_catalog(bytes)
}

fn load_embeddings(
    blob_path: Option<&str>,
    metadata_path: Option<&str>,
) -> Result<Option<(Vec<u8>, EmbeddingMetadata)>, CliError> {
    let Some(blob_path) = blob_path else {
        return Ok(None);
    };
    let metadata_path = metadata_path.ok_or(CliError::MissingMetadata)?;
    let blob = read_file(blob_path)?;
    let metadata: EmbeddingMetadata =
        serde_json::from_slice(&read_file(metadata_path)?).map_err(|source| CliError::Json {
            what: "embedding metadata",
            source,
        })?;
    Ok(Some((blob, metadata)))
}

// =============================================================================
// COMMANDS
// =============================================================================

fn run_index(
    input: &str,
    cache_dir: &str,
    embeddings: Option<&str>,
    metadata: Option<&str>,
) -> Result<(), CliError> {
    let (catalog_bytes, corpus) = load_catalog(input)?;
    let hash = content_hash(&catalog_bytes);
    let cache = AssetCache::new(DirBlobStore::new(cache_dir));

    let projected = serde_json::to_vec(&corpus).map_err(|source| CliError::Json {
        what: "projected corpus",
        source,
    })?;
    if !cache.set_hashed(SEARCH_INDEX_KEY, &projected, hash) {
        eprintln!("warning: could not cache {}", SEARCH_INDEX_KEY);
    }
    println!("indexed {} documents → {}", corpus.docs.len(), SEARCH_INDEX_KEY);

    if let Some((blob, meta)) = load_embeddings(embeddings, metadata)? {
        let meta_bytes = serde_json::to_vec(&meta).map_err(|source| CliError::Json {
            what: "embedding metadata",
            source,
        })?;
        if cache.set_hashed(EMBEDDINGS_KEY, &blob, hash)
            && cache.set_hashed(EMBEDDINGS_METADATA_KEY, &meta_bytes, hash)
        {
            println!(
                "cached {} embeddings ({} dims) → {}",
                meta.count, meta.dimensions, EMBEDDINGS_KEY
            );
        } else {
            eprintln!("warning: could not cache embeddings");
        }
    }
    Ok(())
}

/// Cached embeddings are only trusted when their content hash matches the
/// catalog they were computed from.
fn cached_embeddings(cache_dir: &str, catalog_hash: u32) -> Option<(Vec<u8>, EmbeddingMetadata)> {
    let cache = AssetCache::new(DirBlobStore::new(cache_dir));
    let blob = cache.get_hashed(EMBEDDINGS_KEY, catalog_hash)?;
    let meta_bytes = cache.get_hashed(EMBEDDINGS_METADATA_KEY, catalog_hash)?;
    let metadata: EmbeddingMetadata = serde_json::from_slice(&meta_bytes).ok()?;
    Some((blob, metadata))
}

fn run_search(
    input: &str,
    cache_dir: &str,
    embeddings: Option<&str>,
    metadata: Option<&str>,
    limit: usize,
    no_popularity: bool,
    query: &str,
) -> Result<(), CliError> {
    let catalog_bytes = read_file(input)?;
    let catalog_hash = content_hash(&catalog_bytes);
    let corpus = load_or_project(&catalog_bytes, cache_dir, catalog_hash)?;
    let asset = match load_embeddings(embeddings, metadata)? {
        Some(asset) => Some(asset),
        None => cached_embeddings(cache_dir, catalog_hash),
    };

    let config = EngineConfig {
        boosts: BoostConfig {
            popularity_enabled: !no_popularity,
            ..BoostConfig::default()
        },
        ..EngineConfig::default()
    };
    let engine = SearchEngine::new(
        corpus,
        asset.as_ref().map(|(blob, metadata)| EmbeddingAsset {
            blob,
            metadata: metadata.clone(),
        }),
        config,
    )?;

    if let Some(error) = engine.vector_error() {
        eprintln!("warning: vector matching unavailable ({})", error);
    }

    let color = atty::is(atty::Stream::Stdout);
    let outcome = engine.search(query);
    println!("{}", paint(&outcome.description, DIM, color));

    if outcome.candidates.is_empty() {
        println!("no results");
        return Ok(());
    }
    for (rank, candidate) in outcome.candidates.iter().take(limit).enumerate() {
        let doc = &engine.corpus().docs[candidate.doc_idx];
        println!(
            "{:>3}. {} {}",
            rank + 1,
            paint(&doc.name, BOLD, color),
            paint(&format!("[{}]", doc.kind.as_str()), CYAN, color),
        );
        let boosts = describe_boosts(&candidate.boosts);
        let detail = format!(
            "     score {:.4}{}{}",
            candidate.fused_score,
            candidate
                .vector_similarity
                .map(|s| format!("  sim {:.2}", s))
                .unwrap_or_default(),
            if boosts.is_empty() {
                String::new()
            } else {
                format!("  {}", boosts)
            },
        );
        println!("{}", paint(&detail, DIM, color));
        if !doc.url.is_empty() {
            println!("{}", paint(&format!("     {}", doc.url), DIM, color));
        }
    }
    Ok(())
}

fn run_inspect(cache_dir: &str) -> Result<(), CliError> {
    let cache = AssetCache::new(DirBlobStore::new(cache_dir));
    println!("cache: {}", cache_dir);
    for key in [EMBEDDINGS_KEY, EMBEDDINGS_METADATA_KEY, SEARCH_INDEX_KEY] {
        match cache.stat(key) {
            Some(info) => {
                println!(
                    "  {:<26} {:>10} bytes  stored {} ms  hash {}  {}",
                    key,
                    info.payload_len,
                    info.stored_at_ms,
                    info.content_hash
                        .map(|h| format!("{:08x}", h))
                        .unwrap_or_else(|| "-".to_string()),
                    if info.expired { "EXPIRED" } else { "ok" },
                );
            }
            None => println!("  {:<26} (missing or invalid)", key),
        }
    }
    Ok(())
}

// =============================================================================
// OUTPUT
// =============================================================================

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

fn paint(text: &str, code: &str, enabled: bool) -> String {
    if enabled {
        format!("{}{}{}", code, text, RESET)
    } else {
        text.to_string()
    }
}

fn describe_boosts(boosts: &[BoostTag]) -> String {
    boosts
        .iter()
        .map(|b| match b {
            BoostTag::StrongLexical => "exact",
            BoostTag::StrongVector => "semantic",
            BoostTag::IntentAligned => "intent+",
            BoostTag::IntentMismatch => "intent-",
            BoostTag::Popularity => "popular",
            BoostTag::QuestionMatch => "question",
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Index {
            input,
            cache_dir,
            embeddings,
            metadata,
        } => run_index(&input, &cache_dir, embeddings.as_deref(), metadata.as_deref()),
        Commands::Search {
            input,
            cache_dir,
            embeddings,
            metadata,
            limit,
            no_popularity,
            query,
        } => run_search(
            &input,
            &cache_dir,
            embeddings.as_deref(),
            metadata.as_deref(),
            limit,
            no_popularity,
            &query.join(" "),
        ),
        Commands::Inspect { cache_dir } => run_inspect(&cache_dir),
    };

    if let Err(error) = result {
        eprintln!("❌ {}", error);
        std::process::exit(1);
    }
}
