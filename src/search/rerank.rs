//! Cross-encoder reranking adapter.
//!
//! Scores `(query, passage)` pairs in batches and keeps the top N by
//! descending score. The sort is stable, so ties keep fusion order.

use crate::error::Result;
use crate::model::Reranker;
use crate::passage::Passage;

/// Pairs scored per reranker call.
const RERANK_BATCH: usize = 32;

/// Reranks candidates, returning the top `top_n` as `(score, passage)`
/// sorted by descending score.
///
/// # Errors
///
/// Propagates reranker failures to the caller; there is no silent
/// fallback.
pub fn rerank(
    reranker: &dyn Reranker,
    query: &str,
    candidates: Vec<Passage>,
    top_n: usize,
) -> Result<Vec<(f32, Passage)>> {
    let top_n = top_n.max(1);
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut scores = Vec::with_capacity(candidates.len());
    for chunk in candidates.chunks(RERANK_BATCH) {
        let texts: Vec<&str> = chunk.iter().map(|p| p.text.as_str()).collect();
        scores.extend(reranker.score(query, &texts)?);
    }

    let mut scored: Vec<(f32, Passage)> = scores.into_iter().zip(candidates).collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_n);
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;
    use crate::model::OverlapReranker;
    use crate::passage::PassageMeta;

    struct FailingReranker;

    impl Reranker for FailingReranker {
        fn score(&self, _query: &str, _passages: &[&str]) -> Result<Vec<f32>> {
            Err(IndexError::RerankFailed("model unavailable".to_string()).into())
        }
    }

    /// Scores by a fixed table so tie behavior is controllable.
    struct TableReranker(Vec<f32>);

    impl Reranker for TableReranker {
        fn score(&self, _query: &str, passages: &[&str]) -> Result<Vec<f32>> {
            Ok(passages
                .iter()
                .enumerate()
                .map(|(i, _)| self.0.get(i).copied().unwrap_or(0.0))
                .collect())
        }
    }

    fn passage(id: &str, text: &str) -> Passage {
        Passage::new(id.to_string(), text.to_string(), PassageMeta::default())
    }

    #[test]
    fn test_rerank_orders_by_relevance() {
        let reranker = OverlapReranker::new();
        let candidates = vec![
            passage("a", "cooking recipes and kitchen tips"),
            passage("b", "rust systems programming language"),
            passage("c", "rust language"),
        ];
        let ranked = rerank(&reranker, "rust programming language", candidates, 3).unwrap();
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].1.id, "b");
        for pair in ranked.windows(2) {
            assert!(pair[0].0 >= pair[1].0);
        }
    }

    #[test]
    fn test_rerank_top_n_bound() {
        let reranker = OverlapReranker::new();
        let candidates = vec![
            passage("a", "rust one"),
            passage("b", "rust two"),
            passage("c", "rust three"),
        ];
        let ranked = rerank(&reranker, "rust", candidates, 1).unwrap();
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn test_rerank_stable_ties_keep_input_order() {
        let reranker = TableReranker(vec![0.5, 0.5, 0.5]);
        let candidates = vec![passage("first", "x"), passage("second", "y"), passage("third", "z")];
        let ranked = rerank(&reranker, "q", candidates, 3).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|(_, p)| p.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_rerank_empty_candidates() {
        let reranker = OverlapReranker::new();
        let ranked = rerank(&reranker, "query", Vec::new(), 5).unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_rerank_failure_propagates() {
        let candidates = vec![passage("a", "text")];
        let result = rerank(&FailingReranker, "query", candidates, 5);
        assert!(result.is_err());
    }
}
