//! Deterministic offline models.
//!
//! Hash-based pseudo-embeddings and a token-overlap reranker. Not
//! semantic, but deterministic and dependency-free, which makes builds and
//! tests reproducible without model weights or credentials.

use crate::error::Result;
use crate::index::bm25::tokenize;

use super::{Embedder, Reranker};

/// Default dimension for the hash embedder.
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Deterministic hash-based embedder.
///
/// Each token hashes into a bucket with a sign bit; the resulting vector is
/// L2-normalized. Texts sharing tokens land near each other, which is
/// enough for recall plumbing and tests.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    /// Creates a hash embedder with the given dimension (clamped to ≥ 1).
    #[must_use]
    pub const fn new(dim: usize) -> Self {
        Self {
            dim: if dim == 0 { 1 } else { dim },
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

/// FNV-1a 64-bit, the same stable hash the id scheme uses.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dim
    }

    #[allow(clippy::cast_possible_truncation)]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dim];
        for token in tokenize(text) {
            let hash = fnv1a_64(token.as_bytes());
            let bucket = (hash % self.dim as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }
}

/// Token-overlap cross-scorer.
///
/// Scores each passage by the Dice coefficient between its token set and
/// the query's. Ties preserve input order downstream because the sort is
/// stable.
#[derive(Debug, Clone, Default)]
pub struct OverlapReranker;

impl OverlapReranker {
    /// Creates the reranker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reranker for OverlapReranker {
    #[allow(clippy::cast_precision_loss)]
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let mut query_tokens = tokenize(query);
        query_tokens.sort_unstable();
        query_tokens.dedup();

        Ok(passages
            .iter()
            .map(|passage| {
                let mut tokens = tokenize(passage);
                tokens.sort_unstable();
                tokens.dedup();
                if query_tokens.is_empty() || tokens.is_empty() {
                    return 0.0;
                }
                let shared = tokens
                    .iter()
                    .filter(|t| query_tokens.binary_search(t).is_ok())
                    .count();
                (2.0 * shared as f32) / (query_tokens.len() + tokens.len()) as f32
            })
            .collect())
    }
}
