//! RAG orchestration: build a database from documents, load it, and answer
//! queries with evidence citations.

pub mod citations;
pub mod prompts;

pub use citations::{CITATION_HEADER, append_citations, build_context_and_citations, format_source};
pub use prompts::{build_hyde_prompt, build_rag_prompt};

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::chunking::{SentenceSplitter, chunk_documents};
use crate::config::{ModelType, RagConfig, RetrievalStrategy};
use crate::error::{ConfigError, IndexError, Result};
use crate::ingest::Document;
use crate::model::{
    Embedder, HashEmbedder, HttpReranker, LanguageModel, OpenAiChatModel, OpenAiEmbedder,
    OverlapReranker, Reranker, is_failed_generation,
};
use crate::passage::write_manifest;
use crate::search::{
    FusionOptions, MANIFEST_FILE, MultiDbSearcher, SearchRequest, Searcher,
};

/// Builds the model stack named by the config.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownModelType`] for unrecognized types and
/// propagates API-probe failures.
pub fn build_models(
    config: &RagConfig,
) -> Result<(Arc<dyn LanguageModel>, Arc<dyn Embedder>, Arc<dyn Reranker>)> {
    match config.model_type()? {
        ModelType::Api => Ok((
            Arc::new(OpenAiChatModel::from_env(&config.llm_model_id)),
            Arc::new(OpenAiEmbedder::from_env(&config.emb_model_id)?),
            Arc::new(HttpReranker::from_env(&config.ranker_model_id)),
        )),
        ModelType::Fallback => Ok((
            Arc::new(OpenAiChatModel::from_env(&config.llm_model_id)),
            Arc::new(HashEmbedder::default()),
            Arc::new(OverlapReranker::new()),
        )),
    }
}

/// End-to-end RAG pipeline over one database (or a multi-DB view).
pub struct TinyRag {
    config: RagConfig,
    base_dir: PathBuf,
    llm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    searcher: Option<Searcher>,
    multi: Option<MultiDbSearcher>,
}

impl TinyRag {
    /// Creates the pipeline with explicit models.
    ///
    /// # Errors
    ///
    /// Returns a config error when the database directory cannot be
    /// resolved.
    pub fn new(
        config: RagConfig,
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
    ) -> Result<Self> {
        let base_dir = if config.multi_db {
            PathBuf::from(&config.db_root_dir)
        } else {
            config.resolve_db_dir()?
        };
        info!(db_dir = %base_dir.display(), "database directory resolved");
        Ok(Self {
            config,
            base_dir,
            llm,
            embedder,
            reranker,
            searcher: None,
            multi: None,
        })
    }

    /// Creates the pipeline with the model stack named in the config.
    ///
    /// # Errors
    ///
    /// Propagates model construction and config errors.
    pub fn from_config(config: RagConfig) -> Result<Self> {
        let (llm, embedder, reranker) = build_models(&config)?;
        Self::new(config, llm, embedder, reranker)
    }

    /// The resolved database directory (root directory in multi-DB mode).
    #[must_use]
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// The language model in use.
    #[must_use]
    pub fn llm(&self) -> &Arc<dyn LanguageModel> {
        &self.llm
    }

    /// The loaded single-DB searcher, if any.
    #[must_use]
    pub fn searcher(&self) -> Option<&Searcher> {
        self.searcher.as_ref()
    }

    /// The loaded multi-DB searcher, if any.
    #[must_use]
    pub fn multi_searcher(&self) -> Option<&MultiDbSearcher> {
        self.multi.as_ref()
    }

    /// Builds the database from ingested documents: parallel chunking, the
    /// JSONL manifest, then both indexes, persisted under the database
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::EmptyBuild`] when splitting and filtering
    /// leave nothing to index; build errors abort.
    pub fn build(&mut self, docs: &[Document]) -> Result<()> {
        let splitter = SentenceSplitter::new(self.config.sentence_size);
        let chunks = chunk_documents(docs, &splitter, self.config.min_chunk_len);
        info!(count = chunks.len(), "split sentence success");

        std::fs::create_dir_all(&self.base_dir)?;
        write_manifest(&self.base_dir.join(MANIFEST_FILE), &chunks)?;

        if chunks.is_empty() {
            return Err(IndexError::EmptyBuild {
                min_chunk_len: self.config.min_chunk_len,
            }
            .into());
        }

        info!("build database ......");
        let mut searcher = Searcher::new(Arc::clone(&self.embedder), Arc::clone(&self.reranker));
        searcher.build_db(&chunks, self.config.effective_emb_batch_size())?;
        searcher.save_db(&self.base_dir)?;
        info!("save database success");

        self.searcher = Some(searcher);
        Ok(())
    }

    /// Loads the persisted database (or every database under the root in
    /// multi-DB mode).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DatabaseNotFound`] when the directory is
    /// absent and propagates index load failures.
    pub fn load(&mut self) -> Result<()> {
        if self.config.multi_db {
            let dirs = MultiDbSearcher::discover_db_dirs(&self.base_dir, &self.config.multi_db_names);
            if dirs.is_empty() {
                return Err(ConfigError::DatabaseNotFound {
                    path: self.base_dir.display().to_string(),
                }
                .into());
            }
            let multi = MultiDbSearcher::load(
                &dirs,
                Arc::clone(&self.embedder),
                Arc::clone(&self.reranker),
            );
            self.multi = Some(multi);
            info!("multi-db search load database success");
        } else {
            if !self.base_dir.is_dir() {
                return Err(ConfigError::DatabaseNotFound {
                    path: self.base_dir.display().to_string(),
                }
                .into());
            }
            let mut searcher = Searcher::new(Arc::clone(&self.embedder), Arc::clone(&self.reranker));
            searcher.load_db(&self.base_dir)?;
            self.searcher = Some(searcher);
            info!("search load database success");
        }
        Ok(())
    }

    /// Builds the search request for a query under the configured
    /// retrieval strategy, returning the request plus the draft answer fed
    /// to the final prompt.
    fn plan_query(&self, query: &str, top_n: usize) -> Result<(SearchRequest, String)> {
        let strategy = self.config.retrieval_strategy()?;
        let recall_factor = self.config.recall_factor.unwrap_or(2).max(1);
        let recall_k = (recall_factor * top_n).max(top_n);

        let fusion_method = self.config.fusion_method()?;
        let fusion = FusionOptions {
            rrf_k: self.config.rrf_k,
            bm25_weight: self.config.bm25_weight,
            emb_weight: self.config.emb_weight,
        };

        if strategy == RetrievalStrategy::Hyde {
            let hyde_text = self.llm.generate(&build_hyde_prompt(query));
            let hyde_text = if is_failed_generation(&hyde_text) {
                String::new()
            } else {
                hyde_text.trim().to_string()
            };

            let draft = if self.config.hyde_use_as_answer && !hyde_text.is_empty() {
                hyde_text.clone()
            } else {
                let generated = self.llm.generate(query);
                if is_failed_generation(&generated) {
                    String::new()
                } else {
                    generated
                }
            };

            // A failed hypothetical falls back to the raw query for dense
            // recall.
            let emb_query = if hyde_text.is_empty() {
                query
            } else {
                hyde_text.as_str()
            };
            let request = SearchRequest::uniform(query, top_n)
                .with_emb_query(emb_query)
                .with_recall_k(recall_k)
                .with_fusion_method(fusion_method)
                .with_fusion_options(fusion);
            return Ok((request, draft));
        }

        // Answer-augmented: draft an answer, then widen the recall query
        // with it.
        let generated = self.llm.generate(query);
        let draft = if is_failed_generation(&generated) {
            String::new()
        } else {
            generated
        };
        let search_query = format!("{query}{draft}{query}");
        let request = SearchRequest {
            rerank_query: query.to_string(),
            bm25_query: search_query.clone(),
            emb_query_text: search_query,
            top_n,
            recall_k: Some(recall_k),
            fusion_method,
            fusion,
        };
        Ok((request, draft))
    }

    /// Answers a query: recall, fuse, rerank, then generate the final
    /// answer with the citation list appended.
    ///
    /// # Errors
    ///
    /// Propagates pipeline failures; returns
    /// [`ConfigError::DatabaseNotFound`] when no database is loaded.
    pub fn search(&mut self, query: &str, top_n: usize) -> Result<String> {
        let top_n = top_n.max(1);
        let (request, draft) = self.plan_query(query, top_n)?;

        if self.searcher.is_none() && self.multi.is_none() {
            self.load()?;
        }

        let ranked = if let Some(multi) = &self.multi {
            multi.search_advanced(&request)?
        } else if let Some(searcher) = &self.searcher {
            searcher.search_advanced(&request)?
        } else {
            return Err(ConfigError::DatabaseNotFound {
                path: self.base_dir.display().to_string(),
            }
            .into());
        };

        let (context, cite_lines) = build_context_and_citations(&ranked);
        let prompt = build_rag_prompt(&context, query, &draft);
        let output = self.llm.generate(&prompt);
        Ok(append_citations(&output, &cite_lines))
    }
}
