//! OpenAI-compatible HTTP clients.
//!
//! Chat completions back the [`LanguageModel`] trait and an embeddings
//! endpoint backs [`Embedder`]. Credentials and endpoint come from the
//! environment (`LLM_API_KEY`, `LLM_MODEL_ID`, `LLM_BASE_URL`), with `.env`
//! loaded first. Chat failures are reported in-band as `生成失败: …`
//! strings rather than errors.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::{Error, IndexError, Result};

use super::{Embedder, LanguageModel, Reranker};

/// HTTP timeout for model calls. The agent loop applies its own wall-clock
/// deadline on top of this.
const HTTP_TIMEOUT: Duration = Duration::from_secs(600);

fn env_var(key: &str) -> String {
    std::env::var(key).unwrap_or_default().trim().to_string()
}

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenAiChatModel {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model_id: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiChatModel {
    /// Builds a client from the environment, loading `.env` first.
    ///
    /// `default_model_id` applies when `LLM_MODEL_ID` is unset.
    #[must_use]
    pub fn from_env(default_model_id: &str) -> Self {
        dotenvy::dotenv().ok();
        let model_id = {
            let from_env = env_var("LLM_MODEL_ID");
            if from_env.is_empty() {
                default_model_id.to_string()
            } else {
                from_env
            }
        };
        Self {
            client: reqwest::blocking::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: env_var("LLM_BASE_URL"),
            api_key: env_var("LLM_API_KEY"),
            model_id,
            max_tokens: 2048,
            temperature: 0.0,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl LanguageModel for OpenAiChatModel {
    fn generate(&self, prompt: &str) -> String {
        if self.base_url.is_empty() {
            return "生成失败: LLM_BASE_URL 未配置".to_string();
        }

        let body = json!({
            "model": self.model_id,
            "messages": [
                {"role": "system", "content": "You are a helpful assistant."},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "API调用失败");
                return format!("生成失败: {e}");
            }
        };
        if !response.status().is_success() {
            let status = response.status();
            warn!(%status, "API调用失败");
            return format!("生成失败: HTTP {status}");
        }

        match response.json::<ChatResponse>() {
            Ok(parsed) => parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "API调用失败");
                format!("生成失败: {e}")
            }
        }
    }
}

/// Embeddings client for any OpenAI-compatible endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model_id: String,
    dim: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    /// Builds an embeddings client and probes the model once to learn its
    /// dimension.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe request fails.
    pub fn from_env(model_id: &str) -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut embedder = Self {
            client: reqwest::blocking::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: env_var("LLM_BASE_URL"),
            api_key: env_var("LLM_API_KEY"),
            model_id: model_id.to_string(),
            dim: 0,
        };
        let probe = embedder.request(&["dimension probe"])?;
        embedder.dim = probe.first().map(Vec::len).unwrap_or_default();
        Ok(embedder)
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.model_id,
            "input": texts,
        });
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| Error::Io(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Io(format!(
                "embedding endpoint returned HTTP {}",
                response.status()
            )));
        }
        let parsed: EmbeddingResponse = response.json().map_err(|e| Error::Io(e.to_string()))?;
        Ok(parsed.data.into_iter().map(|row| row.embedding).collect())
    }
}

impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut rows = self.request(&[text])?;
        rows.pop().ok_or_else(|| {
            IndexError::EmbeddingMismatch {
                requested: 1,
                received: 0,
            }
            .into()
        })
    }

    fn embed_batch(&self, texts: &[&str], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        let batch_size = batch_size.max(1);
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size) {
            let rows = self.request(chunk)?;
            if rows.len() != chunk.len() {
                return Err(IndexError::EmbeddingMismatch {
                    requested: chunk.len(),
                    received: rows.len(),
                }
                .into());
            }
            out.extend(rows);
        }
        Ok(out)
    }
}

/// Rerank client for endpoints following the common `/rerank` shape
/// (query + documents in, per-document relevance scores out).
pub struct HttpReranker {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model_id: String,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankRow>,
}

#[derive(Deserialize)]
struct RerankRow {
    index: usize,
    relevance_score: f32,
}

impl HttpReranker {
    /// Builds a rerank client from the environment.
    #[must_use]
    pub fn from_env(model_id: &str) -> Self {
        dotenvy::dotenv().ok();
        Self {
            client: reqwest::blocking::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: env_var("LLM_BASE_URL"),
            api_key: env_var("LLM_API_KEY"),
            model_id: model_id.to_string(),
        }
    }
}

impl Reranker for HttpReranker {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let body = json!({
            "model": self.model_id,
            "query": query,
            "documents": passages,
        });
        let url = format!("{}/rerank", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| IndexError::RerankFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(IndexError::RerankFailed(format!(
                "rerank endpoint returned HTTP {}",
                response.status()
            ))
            .into());
        }
        let parsed: RerankResponse = response
            .json()
            .map_err(|e| IndexError::RerankFailed(e.to_string()))?;

        let mut scores = vec![0.0f32; passages.len()];
        for row in parsed.results {
            if row.index < scores.len() {
                scores[row.index] = row.relevance_score;
            }
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::is_failed_generation;

    #[test]
    fn test_chat_model_without_base_url_fails_in_band() {
        // No endpoint configured: generation must fail in-band, not panic.
        let model = OpenAiChatModel {
            client: reqwest::blocking::Client::new(),
            base_url: String::new(),
            api_key: String::new(),
            model_id: "test".to_string(),
            max_tokens: 16,
            temperature: 0.0,
        };
        let out = model.generate("hello");
        assert!(is_failed_generation(&out));
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        let model = OpenAiChatModel {
            client: reqwest::blocking::Client::new(),
            base_url: "https://api.example.com/v1/".to_string(),
            api_key: String::new(),
            model_id: "test".to_string(),
            max_tokens: 16,
            temperature: 0.0,
        };
        assert_eq!(model.endpoint(), "https://api.example.com/v1/chat/completions");
    }
}
