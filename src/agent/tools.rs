//! Built-in agent tools.
//!
//! `rag_search` runs the hybrid retrieval pipeline as one tool call (HyDE
//! for dense recall, the original query for lexical recall and reranking).
//! `search_online` queries a SerpApi-backed web search. Both return
//! item-list results; provider failures surface as an `error` field in the
//! result, never as a raised error.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::config::FusionMethod;
use crate::error::ToolError;
use crate::model::{LanguageModel, is_failed_generation};
use crate::passage::PassageMeta;
use crate::rag::citations::format_source;
use crate::rag::prompts::build_hyde_prompt;
use crate::search::{FusionOptions, MultiDbSearcher, SearchRequest, Searcher};

use super::tool::{Tool, ToolSpec};

/// HTTP timeout for the web-search provider.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Cap on the HyDE text echoed back in tool output.
const HYDE_ECHO_CAP: usize = 400;
/// Cap on one observation item's text.
const OBSERVATION_ITEM_CAP: usize = 500;

/// Where `rag_search` routes its queries.
pub enum RagBackend {
    /// One loaded database.
    Single(Arc<Searcher>),
    /// A multi-database view with optional per-call routing.
    Multi(Arc<MultiDbSearcher>),
}

impl RagBackend {
    fn search(
        &self,
        db_name: Option<&str>,
        request: &SearchRequest,
    ) -> crate::error::Result<Vec<(f32, crate::passage::Passage)>> {
        match self {
            Self::Single(searcher) => searcher.search_advanced(request),
            Self::Multi(multi) => match db_name {
                Some(name) if !name.is_empty() => multi.search_advanced_in(name, request),
                _ => multi.search_advanced(request),
            },
        }
    }
}

/// Evidence retrieval over the knowledge base (HyDE + RRF + rerank).
pub struct RagSearchTool {
    spec: ToolSpec,
    backend: RagBackend,
    llm: Arc<dyn LanguageModel>,
    recall_factor: usize,
    fusion: FusionOptions,
}

impl RagSearchTool {
    /// Creates the tool over a backend.
    #[must_use]
    pub fn new(
        backend: RagBackend,
        llm: Arc<dyn LanguageModel>,
        recall_factor: usize,
        fusion: FusionOptions,
    ) -> Self {
        Self {
            spec: ToolSpec {
                name: "rag_search".to_string(),
                description: "在当前知识库中进行证据检索（策略：HyDE + RRF + rerank），返回带元数据的片段列表。\
                    当你需要从本地知识库（法律法规、司法案例或其他已建库资料）中寻找答案时使用。\
                    多库部署下可用 db_name 指定目标库；使用案例库时 topk 不宜过大，推荐 3。"
                    .to_string(),
            },
            backend,
            llm,
            recall_factor: recall_factor.max(1),
            fusion,
        }
    }
}

impl Tool for RagSearchTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn prompt_usage(&self) -> String {
        "Action Input 必须是 JSON 对象，字段如下：\n{\n  \"query\": \"用户问题/检索查询（必填）\",\n  \"topk\": 5,\n  \"db_name\": \"多库部署时选择目标库（可选）\"\n}\n".to_string()
    }

    fn run(&self, arguments: &Map<String, Value>) -> Result<Value, ToolError> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        if query.is_empty() {
            return Err(ToolError::MissingArgument {
                name: "rag_search.query".to_string(),
            });
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let topk = arguments
            .get("topk")
            .and_then(Value::as_u64)
            .map_or(5, |v| v as usize)
            .max(1);
        let db_name = arguments.get("db_name").and_then(Value::as_str);

        let recall_k = (topk * self.recall_factor).max(1);

        let hyde_text = self.llm.generate(&build_hyde_prompt(query));
        let hyde_text = if is_failed_generation(&hyde_text) {
            query.to_string()
        } else {
            hyde_text.trim().to_string()
        };
        debug!(hyde_len = hyde_text.chars().count(), "hyde text generated");

        let request = SearchRequest::uniform(query, topk)
            .with_emb_query(&hyde_text)
            .with_recall_k(recall_k)
            .with_fusion_method(FusionMethod::Rrf)
            .with_fusion_options(self.fusion);

        let ranked = self
            .backend
            .search(db_name, &request)
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let items: Vec<Value> = ranked
            .iter()
            .enumerate()
            .map(|(i, (score, passage))| {
                json!({
                    "rank": i + 1,
                    "score": score,
                    "id": passage.id,
                    "text": passage.text,
                    "meta": serde_json::to_value(&passage.meta).unwrap_or(Value::Null),
                })
            })
            .collect();

        let hyde_echo: String = hyde_text.chars().take(HYDE_ECHO_CAP).collect();
        Ok(json!({
            "query": query,
            "hyde_text": hyde_echo,
            "topk": topk,
            "items": items,
        }))
    }
}

/// Web search via SerpApi. Needs `SERPAPI_API_KEY` or `SERPAPI_KEY`.
pub struct SearchOnlineTool {
    spec: ToolSpec,
    client: reqwest::blocking::Client,
}

impl Default for SearchOnlineTool {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchOnlineTool {
    /// Creates the tool; credentials are read lazily per call.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: ToolSpec {
                name: "search_online".to_string(),
                description: "网页搜索引擎（SerpApi）。当你需要回答时事、事实，或你认为知识库信息不足时使用。\
                    当用户问题包含“近期”“最近”“最新”“现在”“当前”等时间词时，考虑使用该工具。"
                    .to_string(),
            },
            client: reqwest::blocking::Client::builder()
                .timeout(SEARCH_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    fn api_key() -> String {
        dotenvy::dotenv().ok();
        for key in ["SERPAPI_API_KEY", "SERPAPI_KEY"] {
            if let Ok(value) = std::env::var(key) {
                let value = value.trim().trim_matches('"').trim_matches('\'').to_string();
                if !value.is_empty() {
                    return value;
                }
            }
        }
        String::new()
    }
}

impl Tool for SearchOnlineTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn prompt_usage(&self) -> String {
        "Action Input 必须是 JSON 对象，字段如下：\n{\n  \"query\": \"搜索关键词（必填）\",\n  \"topk\": 5\n}\n".to_string()
    }

    fn run(&self, arguments: &Map<String, Value>) -> Result<Value, ToolError> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        if query.is_empty() {
            return Err(ToolError::MissingArgument {
                name: "search_online.query".to_string(),
            });
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let topk = arguments
            .get("topk")
            .and_then(Value::as_u64)
            .map_or(5, |v| v as usize)
            .max(1);

        let failure = |error: String| -> Value {
            json!({"query": query, "topk": topk, "items": [], "error": error})
        };

        let api_key = Self::api_key();
        if api_key.is_empty() {
            return Ok(failure("SERPAPI_API_KEY 或 SERPAPI_KEY 未配置".to_string()));
        }

        let response = self
            .client
            .get("https://serpapi.com/search")
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("api_key", api_key.as_str()),
                ("num", &topk.to_string()),
            ])
            .send();
        let response = match response {
            Ok(r) => r,
            Err(e) => return Ok(failure(format!("SerpApi 调用失败：{e}"))),
        };
        let data: Value = match response.json() {
            Ok(v) => v,
            Err(e) => return Ok(failure(format!("SerpApi 调用失败：{e}"))),
        };

        if let Some(error) = data.get("error").and_then(Value::as_str) {
            return Ok(failure(error.to_string()));
        }
        if let Some(status) = data
            .pointer("/search_metadata/status")
            .and_then(Value::as_str)
            && status.eq_ignore_ascii_case("error")
        {
            return Ok(failure("SerpApi 返回错误".to_string()));
        }

        let organic = data
            .get("organic_results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let items: Vec<Value> = organic
            .iter()
            .take(topk)
            .enumerate()
            .map(|(i, result)| {
                let title = result.get("title").and_then(Value::as_str).unwrap_or("");
                let link = result.get("link").and_then(Value::as_str).unwrap_or("");
                let snippet = result.get("snippet").and_then(Value::as_str).unwrap_or("");
                let text = [title, snippet]
                    .iter()
                    .filter(|s| !s.is_empty())
                    .copied()
                    .collect::<Vec<_>>()
                    .join(" | ");
                json!({
                    "rank": i + 1,
                    "score": 0.0,
                    "id": "",
                    "text": text,
                    "meta": {"url": link, "source_path": "online"},
                })
            })
            .collect();

        if items.is_empty() {
            return Ok(failure(
                "未获取到搜索结果（可能是 key 无效/额度不足/网络问题）".to_string(),
            ));
        }
        Ok(json!({"query": query, "topk": topk, "items": items}))
    }
}

/// Formats a tool result into the observation text fed back to the model.
///
/// One `[rank] text` line plus a `source=` line per item, with item text
/// compressed and capped. Case passages deduplicate by source and render
/// as whole section blocks. Errors surface as a leading `error=` line.
#[must_use]
pub fn format_observation(result: &Value) -> String {
    let mut lines: Vec<String> = Vec::new();

    if let Some(error) = result.get("error").and_then(Value::as_str) {
        lines.push(format!("error={error}"));
    }

    let items = result
        .get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut seen_case_sources: Vec<String> = Vec::new();
    let mut display_rank = 0usize;

    for item in &items {
        let meta: PassageMeta = item
            .get("meta")
            .cloned()
            .and_then(|m| serde_json::from_value(m).ok())
            .unwrap_or_default();
        let url = meta.url.clone().unwrap_or_default();
        let text = item.get("text").and_then(Value::as_str).unwrap_or("");

        if meta.is_case() {
            let source_path = meta.source_path.clone().unwrap_or_default();
            if !source_path.is_empty() {
                if seen_case_sources.contains(&source_path) {
                    continue;
                }
                seen_case_sources.push(source_path);
            }

            // Whole section blocks, newlines preserved
            let mut block = String::new();
            if let Some(title) = meta.case_title.as_deref()
                && !title.trim().is_empty()
            {
                block.push_str(title.trim());
            }
            for section in meta.case_sections.as_deref().unwrap_or(&[]) {
                if !block.is_empty() {
                    block.push('\n');
                }
                block.push_str(&format!("【{section}】\n{}", text.trim()));
            }
            if block.is_empty() {
                block = text.trim().to_string();
            }

            display_rank += 1;
            lines.push(format!("[{display_rank}] {block}"));
            lines.push(format!(
                "source={}",
                if url.is_empty() {
                    format_source(&meta)
                } else {
                    url.clone()
                }
            ));
            continue;
        }

        let mut compact = text.trim().replace('\n', " ");
        if compact.chars().count() > OBSERVATION_ITEM_CAP {
            compact = compact.chars().take(OBSERVATION_ITEM_CAP).collect::<String>() + "...";
        }
        display_rank += 1;
        lines.push(format!("[{display_rank}] {compact}"));
        lines.push(format!(
            "source={}",
            if url.is_empty() {
                format_source(&meta)
            } else {
                url
            }
        ));
    }

    if items.is_empty() && result.get("error").is_none() {
        lines.push("（无结果）".to_string());
    }

    lines.join("\n").trim().to_string()
}
