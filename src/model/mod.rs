//! Model interfaces.
//!
//! The LLM, the embedding model, and the cross-encoder reranker are
//! external collaborators. This module defines their contracts, an
//! OpenAI-compatible HTTP stack, and deterministic offline fallbacks used
//! for tests and credential-free runs.
//!
//! LLM failures are in-band: a returned string containing `生成失败` or
//! `API调用失败` marks a failed generation, and callers fall back (for
//! example, to the raw query for dense recall).

pub mod fallback;
pub mod openai;

pub use fallback::{HashEmbedder, OverlapReranker};
pub use openai::{HttpReranker, OpenAiChatModel, OpenAiEmbedder};

use crate::error::Result;

/// Marker that a generation failed locally (timeouts included).
pub const GENERATION_FAILED_MARKER: &str = "生成失败";
/// Marker that the upstream API call failed.
pub const API_FAILED_MARKER: &str = "API调用失败";

/// Text-in/text-out language model.
pub trait LanguageModel: Send + Sync {
    /// Generates a completion for the prompt.
    ///
    /// Infallible by signature: failures come back as strings containing
    /// [`GENERATION_FAILED_MARKER`] or [`API_FAILED_MARKER`].
    fn generate(&self, prompt: &str) -> String;
}

/// Returns `true` when generated text should be treated as a failed
/// generation (empty output or an in-band failure marker).
#[must_use]
pub fn is_failed_generation(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty()
        || trimmed.contains(GENERATION_FAILED_MARKER)
        || trimmed.contains(API_FAILED_MARKER)
}

/// Fixed-dimension text embedding model.
pub trait Embedder: Send + Sync {
    /// The embedding dimension, stable for the lifetime of a database.
    fn dimensions(&self) -> usize;

    /// Embeds a single text.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding backend fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds texts in batches of `batch_size`.
    ///
    /// The default implementation chunks the input and embeds each text
    /// sequentially; backends with native batch endpoints override this.
    ///
    /// # Errors
    ///
    /// Returns an error if any embedding fails.
    fn embed_batch(&self, texts: &[&str], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        let _ = batch_size;
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Cross-encoder relevance scorer. Higher scores are better.
pub trait Reranker: Send + Sync {
    /// Scores each passage against the query.
    ///
    /// # Errors
    ///
    /// Returns an error if scoring fails; the pipeline propagates it with
    /// no silent fallback.
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;
}
