//! Persistent recall indexes: lexical BM25 and dense vectors.
//!
//! Both indexes are built incrementally over batches, share the same
//! insertion-index space (the build inserts passages in the same order on
//! both sides), and are read-only once persisted.

pub mod bm25;
pub mod vector;

pub use bm25::{Bm25Index, Bm25Params};
pub use vector::VectorIndex;

use crate::passage::Passage;

/// One recall result.
///
/// `score` is asymmetric between sources: BM25 scores rank higher-is-better,
/// vector scores are L2 distances ranking smaller-is-better. Consumers must
/// respect this when sorting.
#[derive(Debug, Clone)]
pub struct RecallHit {
    /// Internal insertion index within the database.
    pub index: usize,
    /// The recalled passage.
    pub passage: Passage,
    /// Raw score (BM25: descending-better; vector: ascending-better).
    pub score: f32,
}
