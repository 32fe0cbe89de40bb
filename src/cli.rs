// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "quarry",
    about = "Hybrid lexical + vector search over a static content catalog",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build search assets from a catalog JSON file and cache them
    Index {
        /// Catalog JSON file (array of tagged entries)
        #[arg(short, long)]
        input: String,

        /// Cache directory for processed assets
        #[arg(short, long, default_value = ".quarry")]
        cache_dir: String,

        /// Embedding matrix blob to cache alongside the index
        #[arg(long)]
        embeddings: Option<String>,

        /// Embedding metadata JSON (required with --embeddings)
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Run a query against a catalog
    Search {
        /// Catalog JSON file
        #[arg(short, long)]
        input: String,

        /// Cache directory; cached embeddings are used when --embeddings
        /// is not given
        #[arg(short, long, default_value = ".quarry")]
        cache_dir: String,

        /// Embedding matrix blob
        #[arg(long)]
        embeddings: Option<String>,

        /// Embedding metadata JSON
        #[arg(long)]
        metadata: Option<String>,

        /// Maximum results to print
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Disable the popularity blend
        #[arg(long)]
        no_popularity: bool,

        /// The query, filter syntax included (author:pearl "causal forests" -deprecated)
        #[arg(trailing_var_arg = true)]
        query: Vec<String>,
    },

    /// Inspect cached assets
    Inspect {
        /// Cache directory
        #[arg(short, long, default_value = ".quarry")]
        cache_dir: String,
    },
}
