//! Hybrid search: dual recall, fusion, and reranking over one or many
//! databases.
//!
//! A database directory holds `bm_corpus/` (lexical index), `faiss_idx/`
//! (vector index), and the `split_sentence.jsonl` manifest. Databases are
//! read-only at query time; loaded searchers may be shared by concurrent
//! readers.

pub mod fusion;
pub mod recall;
pub mod rerank;

pub use fusion::{FusionOptions, dedup_fuse, rrf_fuse};
pub use recall::{DbShard, MultiDbRecall, RecallProvider, SingleDbRecall};
pub use rerank::rerank;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::FusionMethod;
use crate::error::{ConfigError, IndexError, Result};
use crate::index::{Bm25Index, VectorIndex};
use crate::model::{Embedder, Reranker};
use crate::passage::Passage;

/// Lexical index subdirectory of a database.
pub const BM_CORPUS_DIR: &str = "bm_corpus";
/// Vector index subdirectory of a database.
pub const FAISS_DIR: &str = "faiss_idx";
/// Chunk manifest file at the database root.
pub const MANIFEST_FILE: &str = "split_sentence.jsonl";

/// One advanced search request.
///
/// The three query strings may differ: under HyDE the hypothetical answer
/// drives dense recall while the original question drives lexical recall
/// and reranking.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Query scored by the cross-encoder.
    pub rerank_query: String,
    /// Query for lexical recall.
    pub bm25_query: String,
    /// Text embedded for dense recall.
    pub emb_query_text: String,
    /// Final result count.
    pub top_n: usize,
    /// Recall budget per source; defaults to `2 * top_n`, clamped to
    /// `>= top_n`.
    pub recall_k: Option<usize>,
    /// How the two recall lists combine.
    pub fusion_method: FusionMethod,
    /// RRF parameters.
    pub fusion: FusionOptions,
}

impl SearchRequest {
    /// Creates a request using one query string for all three roles.
    #[must_use]
    pub fn uniform(query: &str, top_n: usize) -> Self {
        Self {
            rerank_query: query.to_string(),
            bm25_query: query.to_string(),
            emb_query_text: query.to_string(),
            top_n,
            recall_k: None,
            fusion_method: FusionMethod::Dedup,
            fusion: FusionOptions::default(),
        }
    }

    /// Sets the dense-recall query text.
    #[must_use]
    pub fn with_emb_query(mut self, text: &str) -> Self {
        self.emb_query_text = text.to_string();
        self
    }

    /// Sets the recall budget.
    #[must_use]
    pub const fn with_recall_k(mut self, recall_k: usize) -> Self {
        self.recall_k = Some(recall_k);
        self
    }

    /// Sets the fusion method.
    #[must_use]
    pub const fn with_fusion_method(mut self, method: FusionMethod) -> Self {
        self.fusion_method = method;
        self
    }

    /// Sets the RRF parameters.
    #[must_use]
    pub const fn with_fusion_options(mut self, options: FusionOptions) -> Self {
        self.fusion = options;
        self
    }
}

/// Runs recall, fusion, and reranking for a request against a provider.
///
/// # Errors
///
/// Propagates embedding and reranking failures.
pub fn run_search(
    provider: &dyn RecallProvider,
    reranker: &dyn Reranker,
    request: &SearchRequest,
) -> Result<Vec<(f32, Passage)>> {
    let top_n = request.top_n.max(1);
    let recall_k = request.recall_k.unwrap_or(2 * top_n).max(top_n);

    let (bm25_hits, emb_hits) =
        provider.recall(&request.bm25_query, &request.emb_query_text, recall_k)?;
    info!(
        bm25 = bm25_hits.len(),
        emb = emb_hits.len(),
        "recall complete"
    );

    let candidates = match request.fusion_method {
        FusionMethod::Rrf => rrf_fuse(&bm25_hits, &emb_hits, recall_k, &request.fusion),
        FusionMethod::Dedup => dedup_fuse(&bm25_hits, &emb_hits, recall_k),
    };
    info!(count = candidates.len(), "fusion candidates");

    rerank(reranker, &request.rerank_query, candidates, top_n)
}

/// Hybrid searcher over one database.
pub struct Searcher {
    shard: DbShard,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
}

impl Searcher {
    /// Creates an empty searcher; the vector side takes its dimension from
    /// the embedder.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, reranker: Arc<dyn Reranker>) -> Self {
        let dim = embedder.dimensions();
        Self {
            shard: DbShard {
                name: String::new(),
                bm25: Bm25Index::new(),
                vectors: VectorIndex::new(dim),
            },
            embedder,
            reranker,
        }
    }

    /// Number of indexed passages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shard.bm25.len()
    }

    /// Returns `true` if nothing has been indexed or loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shard.bm25.is_empty()
    }

    /// The embedding model backing this searcher.
    #[must_use]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Builds both indexes from a passage list.
    ///
    /// BM25 indexes everything at once; embeddings run in sequential
    /// batches of `batch_size` so the forward payload keeps insertion
    /// order. Both sides insert in the same order and therefore share one
    /// insertion-index space.
    ///
    /// # Errors
    ///
    /// Propagates embedding failures; the build aborts.
    pub fn build_db(&mut self, passages: &[Passage], batch_size: usize) -> Result<()> {
        let batch_size = batch_size.max(1);

        self.shard.bm25.insert_batch(passages);
        info!(count = passages.len(), "bm25 index build success");

        for chunk in passages.chunks(batch_size) {
            let texts: Vec<&str> = chunk.iter().map(|p| p.text.as_str()).collect();
            let embeddings = self.embedder.embed_batch(&texts, batch_size)?;
            if embeddings.len() != chunk.len() {
                return Err(IndexError::EmbeddingMismatch {
                    requested: chunk.len(),
                    received: embeddings.len(),
                }
                .into());
            }
            self.shard.vectors.insert_batch(&embeddings, chunk)?;
        }
        info!(count = passages.len(), "emb index build success");

        Ok(())
    }

    /// Persists both indexes under the database directory.
    ///
    /// # Errors
    ///
    /// Returns an error if files cannot be written.
    pub fn save_db(&mut self, base_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(base_dir)?;
        self.shard.bm25.save(&base_dir.join(BM_CORPUS_DIR))?;
        info!("bm25 index save success");
        self.shard.vectors.save(&base_dir.join(FAISS_DIR))?;
        info!("emb index save success");
        Ok(())
    }

    /// Loads both indexes from the database directory, validating the
    /// vector dimension against the embedder.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::MissingIndex`] or
    /// [`IndexError::DimensionMismatch`].
    pub fn load_db(&mut self, base_dir: &Path) -> Result<()> {
        self.shard.name = base_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.shard.bm25 = Bm25Index::load(&base_dir.join(BM_CORPUS_DIR))?;
        info!("bm25 index load success");
        self.shard.vectors =
            VectorIndex::load(&base_dir.join(FAISS_DIR), self.embedder.dimensions())?;
        info!("emb index load success");
        Ok(())
    }

    /// Runs the full advanced pipeline for a request.
    ///
    /// # Errors
    ///
    /// Propagates embedding and reranking failures.
    pub fn search_advanced(&self, request: &SearchRequest) -> Result<Vec<(f32, Passage)>> {
        let provider = SingleDbRecall {
            shard: &self.shard,
            embedder: self.embedder.as_ref(),
        };
        run_search(&provider, self.reranker.as_ref(), request)
    }

    /// Simple search: one query string, dedup fusion, `recall_k = 2 * top_n`.
    ///
    /// # Errors
    ///
    /// Propagates embedding and reranking failures.
    pub fn search(&self, query: &str, top_n: usize) -> Result<Vec<(f32, Passage)>> {
        let top_n = top_n.max(1);
        let request = SearchRequest::uniform(query, top_n).with_recall_k(2 * top_n);
        self.search_advanced(&request)
    }
}

/// Hybrid searcher fanning out over sibling databases under one root.
pub struct MultiDbSearcher {
    shards: Vec<DbShard>,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
}

impl MultiDbSearcher {
    /// Lists database directories under a root: the named subset when
    /// `names` is non-empty, otherwise every subdirectory, sorted.
    #[must_use]
    pub fn discover_db_dirs(db_root_dir: &Path, names: &[String]) -> Vec<PathBuf> {
        if !db_root_dir.is_dir() {
            return Vec::new();
        }
        if !names.is_empty() {
            return names.iter().map(|n| db_root_dir.join(n)).collect();
        }
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(db_root_dir)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| p.is_dir())
                    .collect()
            })
            .unwrap_or_default();
        dirs.sort();
        dirs
    }

    /// Loads every complete database under the given directories.
    ///
    /// Incomplete directories are skipped with a warning; load failures
    /// are logged and the database contributes empty recall, matching the
    /// per-database failure policy.
    #[must_use]
    pub fn load(
        base_dirs: &[PathBuf],
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
    ) -> Self {
        let mut shards = Vec::new();
        for base_dir in base_dirs {
            let bm_dir = base_dir.join(BM_CORPUS_DIR);
            let faiss_dir = base_dir.join(FAISS_DIR);
            if !(bm_dir.is_dir() && faiss_dir.is_dir()) {
                warn!(path = %base_dir.display(), "skipping incomplete database directory");
                continue;
            }
            let name = base_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let bm25 = match Bm25Index::load(&bm_dir) {
                Ok(index) => index,
                Err(e) => {
                    error!(db = %name, error = %e, "bm25 load failed, treating as empty recall");
                    continue;
                }
            };
            let vectors = match VectorIndex::load(&faiss_dir, embedder.dimensions()) {
                Ok(index) => index,
                Err(e) => {
                    error!(db = %name, error = %e, "vector load failed, treating as empty recall");
                    continue;
                }
            };
            shards.push(DbShard {
                name,
                bm25,
                vectors,
            });
        }
        info!(db_num = shards.len(), "multi-db searcher load complete");
        Self {
            shards,
            embedder,
            reranker,
        }
    }

    /// Names of the loaded databases.
    #[must_use]
    pub fn db_names(&self) -> Vec<&str> {
        self.shards.iter().map(|s| s.name.as_str()).collect()
    }

    /// Number of loaded databases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Returns `true` when no database loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Runs the advanced pipeline fanned out over every database.
    ///
    /// # Errors
    ///
    /// Propagates embedding and reranking failures.
    pub fn search_advanced(&self, request: &SearchRequest) -> Result<Vec<(f32, Passage)>> {
        let provider = MultiDbRecall {
            shards: &self.shards,
            embedder: self.embedder.as_ref(),
        };
        run_search(&provider, self.reranker.as_ref(), request)
    }

    /// Runs the advanced pipeline against one named database.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DatabaseNotFound`] for an unknown name, and
    /// propagates pipeline failures.
    pub fn search_advanced_in(
        &self,
        db_name: &str,
        request: &SearchRequest,
    ) -> Result<Vec<(f32, Passage)>> {
        let shard = self
            .shards
            .iter()
            .find(|s| s.name == db_name)
            .ok_or_else(|| ConfigError::DatabaseNotFound {
                path: db_name.to_string(),
            })?;
        let provider = SingleDbRecall {
            shard,
            embedder: self.embedder.as_ref(),
        };
        run_search(&provider, self.reranker.as_ref(), request)
    }
}
