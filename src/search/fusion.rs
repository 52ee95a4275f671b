//! Fusion of the two recall lists.
//!
//! Reciprocal Rank Fusion sums `weight / (k + rank)` over each source's
//! rank order; the deduplicating union keeps BM25 rank order first. Both
//! sort BM25 by descending score and vector recall by ascending distance
//! before ranking, honoring the score asymmetry between the sources.

use std::collections::HashMap;

use crate::index::RecallHit;
use crate::passage::Passage;

/// RRF parameters.
#[derive(Debug, Clone, Copy)]
pub struct FusionOptions {
    /// The k constant: higher values flatten the rank contribution curve.
    pub rrf_k: u32,
    /// Weight applied to the BM25 list.
    pub bm25_weight: f64,
    /// Weight applied to the vector list.
    pub emb_weight: f64,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            bm25_weight: 1.0,
            emb_weight: 1.0,
        }
    }
}

/// Sorts BM25 hits by descending score, stably.
fn bm25_rank_order(hits: &[RecallHit]) -> Vec<&RecallHit> {
    let mut sorted: Vec<&RecallHit> = hits.iter().collect();
    sorted.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted
}

/// Sorts vector hits by ascending distance, stably.
fn emb_rank_order(hits: &[RecallHit]) -> Vec<&RecallHit> {
    let mut sorted: Vec<&RecallHit> = hits.iter().collect();
    sorted.sort_by(|a, b| {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted
}

/// Reciprocal Rank Fusion over the two recall lists.
///
/// Items are keyed by passage id, then document id, then full text, so the
/// same passage recalled by both sources accumulates one fused score. Ties
/// keep first-seen order (BM25 list first). Returns at most `recall_k`
/// passages by descending fused score.
#[must_use]
pub fn rrf_fuse(
    bm25: &[RecallHit],
    emb: &[RecallHit],
    recall_k: usize,
    options: &FusionOptions,
) -> Vec<Passage> {
    let recall_k = recall_k.max(1);
    let k = f64::from(options.rrf_k.max(1));

    // Insertion order doubles as the tie-break, like a stable sort over an
    // insertion-ordered map.
    let mut order: Vec<(String, f64)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut items: HashMap<String, Passage> = HashMap::new();

    let mut add = |passage: &Passage, contribution: f64| {
        let key = passage.dedup_key();
        if let Some(&pos) = positions.get(&key) {
            order[pos].1 += contribution;
        } else {
            positions.insert(key.clone(), order.len());
            order.push((key.clone(), contribution));
        }
        items.entry(key).or_insert_with(|| passage.clone());
    };

    for (rank, hit) in bm25_rank_order(bm25).iter().enumerate() {
        add(&hit.passage, options.bm25_weight / (k + rank as f64 + 1.0));
    }
    for (rank, hit) in emb_rank_order(emb).iter().enumerate() {
        add(&hit.passage, options.emb_weight / (k + rank as f64 + 1.0));
    }

    let mut fused = order;
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    fused
        .into_iter()
        .take(recall_k)
        .filter_map(|(key, _)| items.remove(&key))
        .collect()
}

/// Deduplicating union: BM25 hits in rank order, then vector hits in rank
/// order, inserting each unseen key; truncated to `recall_k`.
#[must_use]
pub fn dedup_fuse(bm25: &[RecallHit], emb: &[RecallHit], recall_k: usize) -> Vec<Passage> {
    let recall_k = recall_k.max(1);
    let mut seen: HashMap<String, ()> = HashMap::new();
    let mut out: Vec<Passage> = Vec::new();

    for hit in bm25_rank_order(bm25) {
        let key = hit.passage.dedup_key();
        if seen.insert(key, ()).is_none() {
            out.push(hit.passage.clone());
        }
    }
    for hit in emb_rank_order(emb) {
        let key = hit.passage.dedup_key();
        if seen.insert(key, ()).is_none() {
            out.push(hit.passage.clone());
        }
    }

    out.truncate(recall_k);
    out
}
