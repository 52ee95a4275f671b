//! Recall orchestration.
//!
//! A [`RecallProvider`] produces the BM25 and vector recall lists for a
//! query pair. The single-DB provider issues one call per index; the
//! multi-DB provider partitions the recall budget across sibling databases
//! and concatenates, treating a failed database as empty recall.

use tracing::{debug, warn};

use crate::error::Result;
use crate::index::{Bm25Index, RecallHit, VectorIndex};
use crate::model::Embedder;

/// The pair of recall lists: (BM25 hits, vector hits).
pub type RecallLists = (Vec<RecallHit>, Vec<RecallHit>);

/// Produces the two recall lists for a query pair.
pub trait RecallProvider {
    /// Recalls up to `recall_k` hits per source.
    ///
    /// `bm25_query` drives lexical recall; `emb_query_text` is embedded
    /// for dense recall (under HyDE these differ).
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding backend fails.
    fn recall(&self, bm25_query: &str, emb_query_text: &str, recall_k: usize) -> Result<RecallLists>;
}

/// One loaded database: a BM25 index and a vector index over the same
/// insertion-index space.
#[derive(Debug)]
pub struct DbShard {
    /// Database name (directory name under the root).
    pub name: String,
    /// The lexical index.
    pub bm25: Bm25Index,
    /// The dense index.
    pub vectors: VectorIndex,
}

/// Recall over a single database.
pub struct SingleDbRecall<'a> {
    /// The database to query.
    pub shard: &'a DbShard,
    /// Embedding model for the dense query.
    pub embedder: &'a dyn Embedder,
}

impl RecallProvider for SingleDbRecall<'_> {
    fn recall(&self, bm25_query: &str, emb_query_text: &str, recall_k: usize) -> Result<RecallLists> {
        let recall_k = recall_k.max(1);

        let bm25_hits = self.shard.bm25.search(bm25_query, recall_k);
        debug!(count = bm25_hits.len(), "bm25 recall");

        let query_emb = self.embedder.embed(emb_query_text)?;
        let emb_hits = self.shard.vectors.search(&query_emb, recall_k);
        debug!(count = emb_hits.len(), "emb recall");

        Ok((bm25_hits, emb_hits))
    }
}

/// Recall fanned out over several databases.
///
/// The budget partitions as `ceil(recall_k / N)` per database; results
/// concatenate before fusion. A database that yields nothing (for example
/// after a dimension mismatch) is logged and contributes empty recall.
pub struct MultiDbRecall<'a> {
    /// The databases to query.
    pub shards: &'a [DbShard],
    /// Embedding model for the dense query (shared across databases).
    pub embedder: &'a dyn Embedder,
}

impl RecallProvider for MultiDbRecall<'_> {
    fn recall(&self, bm25_query: &str, emb_query_text: &str, recall_k: usize) -> Result<RecallLists> {
        let recall_k = recall_k.max(1);
        let db_num = self.shards.len().max(1);
        let per_db_k = recall_k.div_ceil(db_num).max(1);

        let mut bm25_all = Vec::new();
        for shard in self.shards {
            let hits = shard.bm25.search(bm25_query, per_db_k);
            if hits.is_empty() && !shard.bm25.is_empty() {
                debug!(db = %shard.name, "bm25 recall empty");
            }
            bm25_all.extend(hits);
        }

        let query_emb = self.embedder.embed(emb_query_text)?;
        let mut emb_all = Vec::new();
        for shard in self.shards {
            if query_emb.len() != shard.vectors.dim() {
                warn!(db = %shard.name, "向量召回失败: dimension mismatch, treating as empty");
                continue;
            }
            emb_all.extend(shard.vectors.search(&query_emb, per_db_k));
        }

        Ok((bm25_all, emb_all))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HashEmbedder;
    use crate::passage::{Passage, PassageMeta};

    fn shard(name: &str, texts: &[&str], embedder: &HashEmbedder) -> DbShard {
        let passages: Vec<Passage> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Passage::new(format!("{name}-p{i}"), (*t).to_string(), PassageMeta::default()))
            .collect();

        let mut bm25 = Bm25Index::new();
        bm25.insert_batch(&passages);

        let mut vectors = VectorIndex::new(embedder.dimensions());
        let texts_ref: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        let embs = embedder.embed_batch(&texts_ref, 16).unwrap();
        vectors.insert_batch(&embs, &passages).unwrap();

        DbShard {
            name: name.to_string(),
            bm25,
            vectors,
        }
    }

    #[test]
    fn test_single_db_recall() {
        let embedder = HashEmbedder::new(64);
        let shard = shard("db", &["alpha beta", "gamma delta", "alpha gamma"], &embedder);
        let provider = SingleDbRecall {
            shard: &shard,
            embedder: &embedder,
        };

        let (bm25, emb) = provider.recall("alpha", "alpha", 10).unwrap();
        assert!(!bm25.is_empty());
        assert_eq!(emb.len(), 3);
    }

    #[test]
    fn test_single_db_recall_k_bounds() {
        let embedder = HashEmbedder::new(64);
        let shard = shard("db", &["a b", "a c", "a d", "a e"], &embedder);
        let provider = SingleDbRecall {
            shard: &shard,
            embedder: &embedder,
        };

        let (bm25, emb) = provider.recall("a", "a", 2).unwrap();
        assert!(bm25.len() <= 2);
        assert!(emb.len() <= 2);
    }

    #[test]
    fn test_multi_db_partitions_budget() {
        let embedder = HashEmbedder::new(64);
        let shards = vec![
            shard("one", &["alpha one", "alpha two", "alpha three"], &embedder),
            shard("two", &["alpha four", "alpha five", "alpha six"], &embedder),
        ];
        let provider = MultiDbRecall {
            shards: &shards,
            embedder: &embedder,
        };

        // recall_k=4 over 2 DBs -> ceil(4/2)=2 per database
        let (bm25, emb) = provider.recall("alpha", "alpha", 4).unwrap();
        assert_eq!(bm25.len(), 4);
        assert_eq!(emb.len(), 4);

        // Hits from both databases are present
        let names: Vec<&str> = bm25
            .iter()
            .map(|h| if h.passage.id.starts_with("one") { "one" } else { "two" })
            .collect();
        assert!(names.contains(&"one"));
        assert!(names.contains(&"two"));
    }

    #[test]
    fn test_multi_db_odd_partition_rounds_up() {
        let embedder = HashEmbedder::new(64);
        let shards = vec![
            shard("one", &["alpha a", "alpha b"], &embedder),
            shard("two", &["alpha c", "alpha d"], &embedder),
            shard("three", &["alpha e", "alpha f"], &embedder),
        ];
        let provider = MultiDbRecall {
            shards: &shards,
            embedder: &embedder,
        };

        // ceil(5/3) = 2 per database, up to 6 total
        let (bm25, _) = provider.recall("alpha", "alpha", 5).unwrap();
        assert_eq!(bm25.len(), 6);
    }

    #[test]
    fn test_multi_db_dimension_mismatch_is_empty_recall() {
        let embedder = HashEmbedder::new(64);
        let other_embedder = HashEmbedder::new(32);
        let shards = vec![
            shard("good", &["alpha a"], &embedder),
            shard("bad", &["alpha b"], &other_embedder),
        ];
        let provider = MultiDbRecall {
            shards: &shards,
            embedder: &embedder,
        };

        let (bm25, emb) = provider.recall("alpha", "alpha", 4).unwrap();
        // BM25 still reaches both; vector recall skips the mismatched DB
        assert_eq!(bm25.len(), 2);
        assert_eq!(emb.len(), 1);
        assert!(emb[0].passage.id.starts_with("good"));
    }
}
