//! Configuration for tinyrag-rs.
//!
//! A single enumerated record covers both the build path and the query
//! path. The CLI loads it from a JSON file; every field has a default so a
//! minimal config only names the models it wants.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How retrieval queries are constructed before recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStrategy {
    /// Draft an answer first, then recall with query + draft + query.
    AnswerAugmented,
    /// Generate a hypothetical answer; embed it for dense recall while the
    /// original query drives lexical recall and reranking.
    Hyde,
}

/// How the two recall lists are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMethod {
    /// Reciprocal Rank Fusion.
    Rrf,
    /// Deduplicating union in rank order.
    Dedup,
}

/// How PDF inputs are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfMode {
    /// Plain paginated text.
    Plain,
    /// Judicial-case PDFs with 基本案情/裁判理由/裁判要旨 sections.
    Case,
}

/// Which model stack backs the LLM/embedder/reranker interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// OpenAI-compatible HTTP endpoints.
    Api,
    /// Deterministic offline fallbacks (hash embedder, overlap reranker).
    Fallback,
}

/// Configuration record for build and query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Root directory holding one subdirectory per database.
    pub db_root_dir: String,
    /// Database name (directory under `db_root_dir`). Derived from
    /// `source_path` when empty.
    pub db_name: String,
    /// Input path the database was/will be built from.
    pub source_path: String,

    /// LLM model identifier passed to the chat endpoint.
    pub llm_model_id: String,
    /// Embedding model identifier.
    pub emb_model_id: String,
    /// Cross-encoder reranker model identifier.
    pub ranker_model_id: String,
    /// Device hint ("cpu" or "cuda..."); selects the embedding batch size.
    pub device: String,
    /// Model stack: "api" or "fallback".
    pub model_type: String,

    /// Maximum accumulated segment length for the sentence splitter.
    pub sentence_size: usize,
    /// Minimum passage length; shorter segments are dropped.
    pub min_chunk_len: usize,
    /// Key used to pull text out of JSON/JSONL records.
    pub json_text_key: String,
    /// PDF interpretation: "plain" or "case".
    pub pdf_mode: String,

    /// Retrieval strategy: "answer_augmented" or "hyde".
    pub retrieval_strategy: String,
    /// Fusion method: "rrf" or "dedup".
    pub fusion_method: String,
    /// Recall widening factor: `recall_k = max(top_n, factor * top_n)`.
    /// Defaults to 2 on the direct RAG path and 4 in agent mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recall_factor: Option<usize>,
    /// RRF k parameter.
    pub rrf_k: u32,
    /// RRF weight for the BM25 list.
    pub bm25_weight: f64,
    /// RRF weight for the vector list.
    pub emb_weight: f64,
    /// Under the HyDE strategy, reuse the hypothetical answer as the draft.
    pub hyde_use_as_answer: bool,

    /// Fan recall out over every database under `db_root_dir`.
    pub multi_db: bool,
    /// Restrict the multi-DB view to these database names (empty = all).
    pub multi_db_names: Vec<String>,

    /// Embedding batch size override (falls back to the
    /// `TINYRAG_EMB_BATCH_SIZE` environment variable, then to the device
    /// default of 96 on cuda / 16 on cpu).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emb_batch_size: Option<usize>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            db_root_dir: "data/db".to_string(),
            db_name: String::new(),
            source_path: String::new(),
            llm_model_id: "Qwen/Qwen3-8B".to_string(),
            emb_model_id: "models/bge-base-zh-v1.5".to_string(),
            ranker_model_id: "models/bge-reranker-base".to_string(),
            device: "cpu".to_string(),
            model_type: "api".to_string(),
            sentence_size: 2048,
            min_chunk_len: 20,
            json_text_key: "completion".to_string(),
            pdf_mode: "plain".to_string(),
            retrieval_strategy: "answer_augmented".to_string(),
            fusion_method: "dedup".to_string(),
            recall_factor: None,
            rrf_k: 60,
            bm25_weight: 1.0,
            emb_weight: 1.0,
            hyde_use_as_answer: false,
            multi_db: false,
            multi_db_names: Vec::new(),
            emb_batch_size: None,
        }
    }
}

impl RagConfig {
    /// Loads a config from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LoadFailed`] if the file cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Parses the configured model type.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownModelType`] for unrecognized values.
    pub fn model_type(&self) -> std::result::Result<ModelType, ConfigError> {
        match self.model_type.trim().to_lowercase().as_str() {
            "api" | "openai" => Ok(ModelType::Api),
            "fallback" | "hash" => Ok(ModelType::Fallback),
            other => Err(ConfigError::UnknownModelType {
                name: other.to_string(),
            }),
        }
    }

    /// Parses the configured retrieval strategy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownStrategy`] for unrecognized values.
    pub fn retrieval_strategy(&self) -> std::result::Result<RetrievalStrategy, ConfigError> {
        match self.retrieval_strategy.trim().to_lowercase().as_str() {
            "" | "answer_augmented" => Ok(RetrievalStrategy::AnswerAugmented),
            "hyde" => Ok(RetrievalStrategy::Hyde),
            other => Err(ConfigError::UnknownStrategy {
                name: other.to_string(),
            }),
        }
    }

    /// Parses the configured fusion method.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownFusion`] for unrecognized values.
    pub fn fusion_method(&self) -> std::result::Result<FusionMethod, ConfigError> {
        match self.fusion_method.trim().to_lowercase().as_str() {
            "rrf" => Ok(FusionMethod::Rrf),
            "" | "dedup" => Ok(FusionMethod::Dedup),
            other => Err(ConfigError::UnknownFusion {
                name: other.to_string(),
            }),
        }
    }

    /// Parses the configured PDF mode. Unrecognized values fall back to
    /// plain extraction.
    #[must_use]
    pub fn pdf_mode(&self) -> PdfMode {
        if self.pdf_mode.trim().eq_ignore_ascii_case("case") {
            PdfMode::Case
        } else {
            PdfMode::Plain
        }
    }

    /// Resolves the database directory: `db_root_dir/<name>` where the name
    /// is `db_name` or, when empty, the source file's stem.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnresolvedDatabase`] when neither a name nor a
    /// source path is available.
    pub fn resolve_db_dir(&self) -> std::result::Result<PathBuf, ConfigError> {
        let name = self.resolve_db_name()?;
        Ok(Path::new(&self.db_root_dir).join(name))
    }

    /// Resolves the database name without joining the root directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnresolvedDatabase`] when neither a name nor a
    /// source path is available.
    pub fn resolve_db_name(&self) -> std::result::Result<String, ConfigError> {
        let name = self.db_name.trim();
        if !name.is_empty() {
            return Ok(name.to_string());
        }
        let stem = Path::new(self.source_path.trim())
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if stem.is_empty() {
            return Err(ConfigError::UnresolvedDatabase);
        }
        Ok(stem)
    }

    /// Embedding batch size: config override, then `TINYRAG_EMB_BATCH_SIZE`,
    /// then 96 on cuda / 16 on cpu.
    #[must_use]
    pub fn effective_emb_batch_size(&self) -> usize {
        if let Some(size) = self.emb_batch_size {
            return size.max(1);
        }
        if let Ok(raw) = std::env::var("TINYRAG_EMB_BATCH_SIZE")
            && let Ok(size) = raw.trim().parse::<usize>()
        {
            return size.max(1);
        }
        if self.device.to_lowercase().contains("cuda") {
            96
        } else {
            16
        }
    }
}
