//! Error types for tinyrag-rs operations.
//!
//! This module provides the error hierarchy using `thiserror` for all
//! operations: configuration, ingestion, index build/load, search, and the
//! agent loop.

use thiserror::Error;

/// Result type alias for tinyrag-rs operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for tinyrag-rs operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (missing database, unknown model type, ...).
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Ingestion errors (unreadable or unparseable input files).
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Index build/load errors.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Agent loop errors.
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// Tool execution errors (normally demoted to observations).
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    /// Generic I/O error wrapper.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read or parsed.
    #[error("failed to load config {path}: {reason}")]
    LoadFailed {
        /// Path to the config file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Database directory does not exist.
    #[error("database directory not found: {path}")]
    DatabaseNotFound {
        /// Expected database directory.
        path: String,
    },

    /// Unknown model type requested.
    #[error("unknown model type: {name} (expected one of: api, fallback)")]
    UnknownModelType {
        /// The unrecognized model type string.
        name: String,
    },

    /// Unknown retrieval strategy requested.
    #[error("unknown retrieval strategy: {name} (expected one of: answer_augmented, hyde)")]
    UnknownStrategy {
        /// The unrecognized strategy string.
        name: String,
    },

    /// Unknown fusion method requested.
    #[error("unknown fusion method: {name} (expected one of: rrf, dedup)")]
    UnknownFusion {
        /// The unrecognized fusion string.
        name: String,
    },

    /// Neither a db name nor a source path was given to derive one from.
    #[error("cannot resolve database directory: set db_name or source_path")]
    UnresolvedDatabase,
}

/// Ingestion-specific errors. Fatal to a build.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Input path does not exist.
    #[error("input path not found: {path}")]
    InputNotFound {
        /// The missing path.
        path: String,
    },

    /// Failed to read an input file.
    #[error("failed to read {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to parse an input file (PDF structure, JSON syntax, ...).
    #[error("failed to parse {path}: {reason}")]
    ParseFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },
}

/// Index build/load errors. Fatal to a query.
#[derive(Error, Debug)]
pub enum IndexError {
    /// A persisted index file is missing.
    #[error("missing index file: {path}")]
    MissingIndex {
        /// The missing file or directory.
        path: String,
    },

    /// Persisted vector dimension does not match the embedding model.
    #[error("vector index dimension mismatch: index has {found}, embedder produces {expected}")]
    DimensionMismatch {
        /// Dimension recorded in the index.
        found: usize,
        /// Dimension expected by the current embedder.
        expected: usize,
    },

    /// The build produced zero passages.
    #[error(
        "build produced no passages after splitting and filtering; \
         check that min_chunk_len ({min_chunk_len}) is not larger than your typical \
         sentence (try 20), or adjust sentence_size"
    )]
    EmptyBuild {
        /// The configured minimum chunk length.
        min_chunk_len: usize,
    },

    /// Serialization/deserialization of a persisted structure failed.
    #[error("index serialization error: {0}")]
    Serialization(String),

    /// Embedding batch returned the wrong number of vectors.
    #[error("embedding batch mismatch: requested {requested}, received {received}")]
    EmbeddingMismatch {
        /// Number of texts submitted.
        requested: usize,
        /// Number of vectors returned.
        received: usize,
    },

    /// Reranker failure. Propagates to the caller, no silent fallback.
    #[error("rerank failed: {0}")]
    RerankFailed(String),
}

/// Agent-loop errors.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Question was empty after trimming.
    #[error("question must not be empty")]
    EmptyQuestion,
}

/// Tool contract violations and execution failures.
///
/// These are demoted to text observations inside the agent loop; they only
/// surface as errors through the registry API.
#[derive(Error, Debug)]
pub enum ToolError {
    /// Registering a tool whose name is empty.
    #[error("tool name must not be empty")]
    EmptyName,

    /// Registering a duplicate tool name.
    #[error("tool already registered: {name}")]
    Duplicate {
        /// The already-registered name.
        name: String,
    },

    /// Dispatching to an unregistered tool.
    #[error("unknown tool: {name}")]
    Unknown {
        /// The requested name.
        name: String,
    },

    /// Tool arguments were not a JSON object.
    #[error("tool arguments must be a JSON object")]
    InvalidArguments,

    /// A required argument was missing or empty.
    #[error("missing required argument: {name}")]
    MissingArgument {
        /// The missing argument name.
        name: String,
    },

    /// The tool ran but failed.
    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),
}

// Implement From traits for standard library and dependency errors

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Index(IndexError::Serialization(err.to_string()))
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for IndexError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
