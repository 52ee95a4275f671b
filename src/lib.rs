//! # tinyrag-rs
//!
//! A retrieval-augmented question-answering core: hybrid recall (BM25 +
//! vectors), Reciprocal Rank Fusion, cross-encoder reranking, and a ReAct
//! tool-using agent loop with stable evidence citations.
//!
//! ## Features
//!
//! - **Ingestion**: deterministic, source-aware chunking of text,
//!   Markdown, PDF (plain and judicial-case modes), and JSON records
//! - **Dual recall**: a persisted Okapi BM25 index and an IVF-flat vector
//!   index sharing one insertion-index space
//! - **Fusion + rerank**: RRF or deduplicating union, then batched
//!   cross-encoder scoring
//! - **Agent loop**: bounded `Thought → Action → Observation` rounds with
//!   tool-call budgets and LLM timeouts

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// Note: unsafe is needed for memory-mapped I/O (memmap2)
#![warn(unsafe_code)]

pub mod agent;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod ingest;
pub mod model;
pub mod passage;
pub mod rag;
pub mod search;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use config::{FusionMethod, PdfMode, RagConfig, RetrievalStrategy};
pub use ingest::Document;
pub use passage::{DocType, Passage, PassageMeta, make_chunk_id, make_doc_id};

// Re-export chunking types
pub use chunking::{SentenceSplitter, chunk_document, chunk_documents};

// Re-export index types
pub use index::{Bm25Index, RecallHit, VectorIndex};

// Re-export search types
pub use search::{
    FusionOptions, MultiDbSearcher, SearchRequest, Searcher, dedup_fuse, rrf_fuse,
};

// Re-export model interfaces
pub use model::{Embedder, LanguageModel, Reranker};

// Re-export the RAG orchestrator
pub use rag::TinyRag;

// Re-export agent types
pub use agent::{AgentOptions, AgentRun, ReActAgent, ToolRegistry, parse_react};

// Re-export CLI types
pub use cli::{Cli, Commands, execute};
