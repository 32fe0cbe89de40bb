// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Semantic matching over precomputed document embeddings.
//!
//! The embedding matrix is produced offline (384-dim all-MiniLM-L6-v2,
//! L2-normalized at generation time) and shipped as a binary blob plus a
//! JSON metadata record. Because vectors are pre-normalized, cosine
//! similarity reduces to a dot product.
//!
//! There is no query encoder at search time - running a transformer per
//! keystroke is out of the question. Instead `query_embedding` derives a
//! proxy vector: run the lexical matcher on the query, average the
//! embeddings of up to 5 best hits, and L2-renormalize. With zero lexical
//! hits it averages the first 10 corpus embeddings, so the vector path
//! always yields *some* ranking. This is a deliberate compromise; keep it.
//!
//! Load failures produce an explicit error which the engine maps to an
//! "unavailable" state - fusion then degrades to lexical-only. Nothing in
//! this module panics on bad input.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::lexical::LexicalIndex;
use crate::types::Corpus;

/// How many lexical hits feed the proxy query embedding.
const PROXY_HIT_COUNT: usize = 5;

/// Fallback: average this many leading corpus rows when lexical comes up dry.
const PROXY_FALLBACK_PREFIX: usize = 10;

// =============================================================================
// METADATA + ENCODING
// =============================================================================

/// Wire encoding of the embedding matrix blob.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "lowercase")]
pub enum EmbeddingEncoding {
    /// Row-major little-endian f32, `count * dimensions * 4` bytes.
    F32le,
    /// 8-bit scalar quantization, `count * dimensions` bytes.
    /// Dequantize with `x = scale * q + offset` (q is the raw byte).
    /// Typical values: `scale = (max - min) / 255`, `offset = min`.
    U8 { scale: f32, offset: f32 },
}

/// Metadata shipped alongside the embedding blob.
///
/// `ids` is ordered 1:1 with matrix rows and links rows back to document
/// ids; documents absent from it simply have no embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingMetadata {
    pub model: String,
    pub dimensions: usize,
    pub count: usize,
    #[serde(flatten)]
    pub encoding: EmbeddingEncoding,
    pub ids: Vec<String>,
}

/// Why an embedding blob failed to load. The engine maps any of these to
/// vector-unavailable; they never cross the public search boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorLoadError {
    /// dimensions or count of zero.
    EmptyMatrix,
    /// Blob length doesn't match `count * dimensions` under the encoding.
    SizeMismatch { expected: usize, actual: usize },
    /// Metadata ids don't line up with the declared row count.
    IdCountMismatch { ids: usize, count: usize },
}

impl fmt::Display for VectorLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorLoadError::EmptyMatrix => write!(f, "embedding matrix is empty"),
            VectorLoadError::SizeMismatch { expected, actual } => {
                write!(f, "blob size {} != expected {}", actual, expected)
            }
            VectorLoadError::IdCountMismatch { ids, count } => {
                write!(f, "{} ids for {} declared rows", ids, count)
            }
        }
    }
}

impl std::error::Error for VectorLoadError {}

// =============================================================================
// MATH HELPERS
// =============================================================================

/// Dot product. With pre-normalized inputs this *is* cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// L2-normalize in place. A zero vector stays zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = dot(v, v).sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// =============================================================================
// INDEX
// =============================================================================

/// A vector hit: matrix row + similarity. The engine translates rows into
/// corpus positions through the metadata ids.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorHit {
    pub row: usize,
    pub similarity: f32,
}

/// The loaded embedding matrix. Frozen after `load`.
#[derive(Debug)]
pub struct VectorIndex {
    dimensions: usize,
    /// Row-major, `ids.len() * dimensions` entries.
    matrix: Vec<f32>,
    ids: Vec<String>,
}

impl VectorIndex {
    /// Parse an embedding blob against its metadata.
    ///
    /// Quantized blobs are dequantized once here so search stays a pure
    /// f32 dot product.
    pub fn load(blob: &[u8], metadata: &EmbeddingMetadata) -> Result<Self, VectorLoadError> {
        if metadata.dimensions == 0 || metadata.count == 0 {
            return Err(VectorLoadError::EmptyMatrix);
        }
        if metadata.ids.len() != metadata.count {
            return Err(VectorLoadError::IdCountMismatch {
                ids: metadata.ids.len(),
                count: metadata.count,
            });
        }

        let values = metadata.count * metadata.dimensions;
        let matrix = match metadata.encoding {
            EmbeddingEncoding::F32le => {
                let expected = values * 4;
                if blob.len() != expected {
                    return Err(VectorLoadError::SizeMismatch {
                        expected,
                        actual: blob.len(),
                    });
                }
                blob.chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect()
            }
            EmbeddingEncoding::U8 { scale, offset } => {
                if blob.len() != values {
                    return Err(VectorLoadError::SizeMismatch {
                        expected: values,
                        actual: blob.len(),
                    });
                }
                blob.iter().map(|&q| scale * f32::from(q) + offset).collect()
            }
        };

        Ok(VectorIndex {
            dimensions: metadata.dimensions,
            matrix,
            ids: metadata.ids.clone(),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Document ids in row order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// One matrix row.
    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dimensions)?;
        self.matrix.get(start..start + self.dimensions)
    }

    /// Derive the proxy query embedding (see module docs). Returns None
    /// only when the matrix has no usable rows at all.
    pub fn query_embedding(
        &self,
        clean_query: &str,
        lexical: &LexicalIndex,
        corpus: &Corpus,
    ) -> Option<Vec<f32>> {
        let mut acc = vec![0.0f32; self.dimensions];
        let mut used = 0usize;

        for hit in lexical.search(clean_query) {
            if used == PROXY_HIT_COUNT {
                break;
            }
            let Some(row) = corpus.doc(hit.doc_idx).and_then(|d| d.embedding_row) else {
                continue;
            };
            if let Some(embedding) = self.row(row) {
                for (a, x) in acc.iter_mut().zip(embedding) {
                    *a += x;
                }
                used += 1;
            }
        }

        if used == 0 {
            // Fixed-prefix fallback keeps the vector path alive for queries
            // the lexical matcher knows nothing about.
            for row in 0..self.len().min(PROXY_FALLBACK_PREFIX) {
                if let Some(embedding) = self.row(row) {
                    for (a, x) in acc.iter_mut().zip(embedding) {
                        *a += x;
                    }
                    used += 1;
                }
            }
        }

        if used == 0 {
            return None;
        }

        let inv = 1.0 / used as f32;
        for a in acc.iter_mut() {
            *a *= inv;
        }
        l2_normalize(&mut acc);
        Some(acc)
    }

    /// Rank all rows by dot product against the query, descending.
    /// Ties break by row ascending (corpus order).
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<VectorHit> {
        if query.len() != self.dimensions || top_k == 0 {
            return Vec::new();
        }

        let mut hits: Vec<VectorHit> = (0..self.len())
            .filter_map(|row| {
                self.row(row).map(|embedding| VectorHit {
                    row,
                    similarity: dot(query, embedding),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then(a.row.cmp(&b.row))
        });
        hits.truncate(top_k);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::FieldWeights;
    use crate::types::CatalogEntry;

    fn metadata(count: usize, dims: usize, ids: Vec<String>) -> EmbeddingMetadata {
        EmbeddingMetadata {
            model: "all-MiniLM-L6-v2".to_string(),
            dimensions: dims,
            count,
            encoding: EmbeddingEncoding::F32le,
            ids,
        }
    }

    fn f32_blob(rows: &[Vec<f32>]) -> Vec<u8> {
        rows.iter()
            .flatten()
            .flat_map(|x| x.to_le_bytes())
            .collect()
    }

    fn unit(dims: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dims];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn load_f32_roundtrip() {
        let rows = vec![unit(4, 0), unit(4, 2)];
        let blob = f32_blob(&rows);
        let meta = metadata(2, 4, vec!["a".to_string(), "b".to_string()]);
        let index = VectorIndex::load(&blob, &meta).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.row(1).unwrap(), &rows[1][..]);
    }

    #[test]
    fn load_rejects_size_mismatch() {
        let meta = metadata(2, 4, vec!["a".to_string(), "b".to_string()]);
        let err = VectorIndex::load(&[0u8; 7], &meta).unwrap_err();
        assert!(matches!(err, VectorLoadError::SizeMismatch { .. }));
    }

    #[test]
    fn load_rejects_empty_and_misaligned_metadata() {
        let meta = metadata(0, 4, vec![]);
        assert_eq!(
            VectorIndex::load(&[], &meta).unwrap_err(),
            VectorLoadError::EmptyMatrix
        );
        let meta = metadata(2, 4, vec!["only-one".to_string()]);
        assert!(matches!(
            VectorIndex::load(&[0u8; 32], &meta).unwrap_err(),
            VectorLoadError::IdCountMismatch { .. }
        ));
    }

    #[test]
    fn u8_dequantization_applies_scale_and_offset() {
        // scale 0.1, offset -1.0: byte 10 → 0.0, byte 20 → 1.0
        let meta = EmbeddingMetadata {
            model: "quantized".to_string(),
            dimensions: 2,
            count: 1,
            encoding: EmbeddingEncoding::U8 {
                scale: 0.1,
                offset: -1.0,
            },
            ids: vec!["a".to_string()],
        };
        let index = VectorIndex::load(&[10, 20], &meta).unwrap();
        let row = index.row(0).unwrap();
        assert!((row[0] - 0.0).abs() < 1e-6);
        assert!((row[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn search_orders_by_similarity_then_row() {
        let rows = vec![unit(3, 1), unit(3, 0), unit(3, 0)];
        let blob = f32_blob(&rows);
        let meta = metadata(3, 3, vec!["a".into(), "b".into(), "c".into()]);
        let index = VectorIndex::load(&blob, &meta).unwrap();

        let hits = index.search(&unit(3, 0), 10);
        assert_eq!(hits.len(), 3);
        // rows 1 and 2 tie at similarity 1.0; row ascending breaks it
        assert_eq!(hits[0].row, 1);
        assert_eq!(hits[1].row, 2);
        assert_eq!(hits[2].row, 0);
    }

    #[test]
    fn search_rejects_dimension_mismatch() {
        let blob = f32_blob(&[unit(3, 0)]);
        let meta = metadata(1, 3, vec!["a".into()]);
        let index = VectorIndex::load(&blob, &meta).unwrap();
        assert!(index.search(&[1.0, 0.0], 5).is_empty());
    }

    #[test]
    fn normalize_handles_zero_vector() {
        let mut v = vec![0.0f32; 3];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);

        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn proxy_embedding_averages_lexical_hits() {
        let entries = vec![
            CatalogEntry::Package {
                name: "Causal Forests".to_string(),
                description: "effects".to_string(),
                category: String::new(),
                url: String::new(),
                tags: vec![],
                language: None,
                best_for: None,
                model_score: 0.0,
                questions: vec![],
            },
            CatalogEntry::Package {
                name: "Other Tool".to_string(),
                description: "unrelated".to_string(),
                category: String::new(),
                url: String::new(),
                tags: vec![],
                language: None,
                best_for: None,
                model_score: 0.0,
                questions: vec![],
            },
        ];
        let mut corpus = Corpus::load(&entries).unwrap();
        corpus.docs[0].embedding_row = Some(0);
        corpus.docs[1].embedding_row = Some(1);
        let lexical = LexicalIndex::build(&corpus, FieldWeights::default()).unwrap();

        let rows = vec![unit(3, 0), unit(3, 1)];
        let blob = f32_blob(&rows);
        let meta = metadata(2, 3, vec!["a".into(), "b".into()]);
        let index = VectorIndex::load(&blob, &meta).unwrap();

        // "causal" hits doc 0 only → proxy is doc 0's embedding
        let q = index.query_embedding("causal", &lexical, &corpus).unwrap();
        assert!((q[0] - 1.0).abs() < 1e-6);

        // nonsense query → fixed-prefix fallback, normalized average of all rows
        let q = index.query_embedding("zzz", &lexical, &corpus).unwrap();
        assert!(q[0] > 0.0 && q[1] > 0.0);
        assert!((dot(&q, &q) - 1.0).abs() < 1e-5);
    }
}
