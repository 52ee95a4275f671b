//! The ReAct agent loop.
//!
//! A bounded `Thought → Action → Observation` state machine. Each step
//! prompts the LLM with the tool catalog, the question, and the history so
//! far; parses the output; dispatches at most `max_tool_calls` tool calls;
//! and appends the formatted observation to the history. The loop ends on
//! `Final`, on unparseable output (returned as the answer), or after
//! `max_steps` iterations.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::model::LanguageModel;

use super::parse::{ReActOutcome, parse_react};
use super::prompts::render_prompt;
use super::tool::ToolRegistry;
use super::tools::format_observation;

/// Returned when the loop exhausts `max_steps` without a `Final`.
pub const MAX_STEPS_MESSAGE: &str = "已达到最大步数，仍未得到 Final 输出。";

/// Injected as the observation once the tool-call budget is spent.
pub const BUDGET_EXHAUSTED_MESSAGE: &str = "工具调用次数已达上限，请基于已有 Observation 输出 Final。";

/// The outcome of one agent run.
#[derive(Debug, Clone)]
pub struct AgentRun {
    /// The final answer (or failure message / raw model text).
    pub answer: String,
    /// The accumulated `Thought/Action/Observation` history.
    pub history: String,
}

/// Configuration for the agent loop.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Hard cap on loop iterations.
    pub max_steps: usize,
    /// `topk` injected into tool calls that omit it.
    pub default_topk: usize,
    /// Hard cap on executed tool calls per query. Zero forces a `Final`
    /// without retrieval.
    pub max_tool_calls: usize,
    /// Wall-clock deadline per LLM invocation.
    pub llm_timeout: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_steps: 6,
            default_topk: 5,
            max_tool_calls: 2,
            llm_timeout: Duration::from_secs(180),
        }
    }
}

/// The ReAct agent.
pub struct ReActAgent {
    llm: Arc<dyn LanguageModel>,
    registry: ToolRegistry,
    options: AgentOptions,
}

impl ReActAgent {
    /// Creates an agent over a tool registry.
    #[must_use]
    pub fn new(llm: Arc<dyn LanguageModel>, registry: ToolRegistry, options: AgentOptions) -> Self {
        let options = AgentOptions {
            max_steps: options.max_steps.max(1),
            default_topk: options.default_topk.max(1),
            llm_timeout: options.llm_timeout.max(Duration::from_secs(1)),
            ..options
        };
        Self {
            llm,
            registry,
            options,
        }
    }

    /// Calls the LLM on a worker thread with a wall-clock deadline.
    ///
    /// On timeout the worker is abandoned (its eventual output discarded)
    /// and the in-band failure string is produced; the parser cannot read
    /// it as an action.
    fn call_llm(&self, prompt: &str) -> String {
        let (tx, rx) = mpsc::channel();
        let llm = Arc::clone(&self.llm);
        let prompt = prompt.to_string();
        std::thread::spawn(move || {
            let _ = tx.send(llm.generate(&prompt));
        });
        match rx.recv_timeout(self.options.llm_timeout) {
            Ok(output) => output,
            Err(_) => {
                warn!(timeout_sec = self.options.llm_timeout.as_secs(), "LLM call timed out");
                format!(
                    "生成失败: LLM 调用超时（>{}s）",
                    self.options.llm_timeout.as_secs()
                )
            }
        }
    }

    /// Runs the loop for one question.
    ///
    /// Returns the answer and the accumulated history. On step exhaustion
    /// the answer is [`MAX_STEPS_MESSAGE`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::EmptyQuestion`] for a blank question.
    pub fn run(&self, question: &str) -> Result<AgentRun> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AgentError::EmptyQuestion.into());
        }

        let tools_txt = self.registry.format_tools_for_prompt();
        let mut history = String::new();
        let mut tool_call_count = 0usize;

        for step in 1..=self.options.max_steps {
            debug!(step, "agent step");
            let prompt = render_prompt(&tools_txt, question, &history);
            let model_out = self.call_llm(&prompt).trim().to_string();

            match parse_react(&model_out) {
                ReActOutcome::Final { answer } => {
                    info!(step, "agent reached final answer");
                    return Ok(AgentRun { answer, history });
                }
                ReActOutcome::Raw { .. } => {
                    // Neither Final nor Action parsed: the raw text is the
                    // answer and the loop terminates.
                    info!(step, "agent output unparseable, returning raw text");
                    return Ok(AgentRun {
                        answer: model_out,
                        history,
                    });
                }
                ReActOutcome::Action {
                    thought,
                    name,
                    input,
                } => {
                    let mut arguments = input.unwrap_or_default();
                    if !arguments.contains_key("topk") {
                        arguments.insert("topk".to_string(), Value::from(self.options.default_topk));
                    }

                    let observation = if tool_call_count >= self.options.max_tool_calls {
                        info!(step, "tool-call budget exhausted");
                        BUDGET_EXHAUSTED_MESSAGE.to_string()
                    } else {
                        debug!(step, tool = %name, "dispatching tool");
                        let value = Value::Object(arguments.clone());
                        let result = match self.registry.execute(&name, Some(&value)) {
                            Ok(result) => result,
                            Err(e) => {
                                // Tool failures become observations, never
                                // loop errors.
                                serde_json::json!({"items": [], "error": e.to_string()})
                            }
                        };
                        tool_call_count += 1;
                        format_observation(&result)
                    };

                    let mut block: Vec<String> = Vec::new();
                    if !thought.is_empty() {
                        block.push(format!("Thought: {thought}"));
                    }
                    block.push(format!("Action: {name}"));
                    block.push(format!(
                        "Action Input: {}",
                        serde_json::to_string(&Value::Object(arguments)).unwrap_or_default()
                    ));
                    block.push(format!("Observation:\n{observation}"));

                    if history.is_empty() {
                        history = block.join("\n");
                    } else {
                        history = format!("{history}\n\n{}", block.join("\n"));
                    }
                }
            }
        }

        Ok(AgentRun {
            answer: MAX_STEPS_MESSAGE.to_string(),
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tool::{Tool, ToolSpec};
    use crate::error::ToolError;
    use serde_json::Map;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// LLM returning scripted outputs in order (repeats the last one).
    struct ScriptedLlm {
        outputs: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(outputs: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                outputs: Mutex::new(outputs.iter().rev().map(ToString::to_string).collect()),
            })
        }
    }

    impl LanguageModel for ScriptedLlm {
        fn generate(&self, _prompt: &str) -> String {
            let mut outputs = self.outputs.lock().unwrap();
            if outputs.len() > 1 {
                outputs.pop().unwrap_or_default()
            } else {
                outputs.last().cloned().unwrap_or_default()
            }
        }
    }

    /// Tool that counts invocations and returns one canned item.
    struct CountingTool {
        spec: ToolSpec,
        calls: Arc<AtomicUsize>,
    }

    impl CountingTool {
        fn boxed(calls: Arc<AtomicUsize>) -> Box<dyn Tool> {
            Box::new(Self {
                spec: ToolSpec {
                    name: "rag_search".to_string(),
                    description: "test retrieval".to_string(),
                },
                calls,
            })
        }
    }

    impl Tool for CountingTool {
        fn spec(&self) -> &ToolSpec {
            &self.spec
        }

        fn run(
            &self,
            arguments: &Map<String, serde_json::Value>,
        ) -> std::result::Result<serde_json::Value, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(arguments.contains_key("topk"));
            Ok(serde_json::json!({
                "items": [{"rank": 1, "text": "证据片段", "meta": {"source_path": "a.txt"}}]
            }))
        }
    }

    fn agent_with(llm: Arc<dyn LanguageModel>, calls: &Arc<AtomicUsize>, options: AgentOptions) -> ReActAgent {
        let mut registry = ToolRegistry::new();
        registry.register(CountingTool::boxed(Arc::clone(calls))).unwrap();
        ReActAgent::new(llm, registry, options)
    }

    #[test]
    fn test_immediate_final() {
        let llm = ScriptedLlm::new(&["Thought: 已知\nFinal: 直接回答"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = agent_with(llm, &calls, AgentOptions::default());

        let run = agent.run("问题").unwrap();
        assert_eq!(run.answer, "直接回答");
        assert!(run.history.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_action_then_final() {
        let llm = ScriptedLlm::new(&[
            "Thought: 需要检索\nAction: rag_search\nAction Input: {\"query\": \"南京\", \"topk\": 3}",
            "Thought: 已足够\nFinal: 南京是江苏省会 [1]\n引用信息如下：\n[1] a.txt",
        ]);
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = agent_with(llm, &calls, AgentOptions::default());

        let run = agent.run("南京是什么").unwrap();
        assert!(run.answer.contains("南京是江苏省会"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // History carries the full step block
        assert!(run.history.contains("Thought: 需要检索"));
        assert!(run.history.contains("Action: rag_search"));
        assert!(run.history.contains("Action Input:"));
        assert!(run.history.contains("Observation:\n[1] 证据片段"));
    }

    #[test]
    fn test_default_topk_injected() {
        let llm = ScriptedLlm::new(&[
            "Action: rag_search\nAction Input: {\"query\": \"x\"}",
            "Final: 完成",
        ]);
        let calls = Arc::new(AtomicUsize::new(0));
        let options = AgentOptions {
            default_topk: 7,
            ..AgentOptions::default()
        };
        let agent = agent_with(llm, &calls, options);

        let run = agent.run("q").unwrap();
        assert!(run.history.contains("\"topk\":7"));
    }

    #[test]
    fn test_budget_exhaustion_injects_observation() {
        // The model insists on a second rag_search, then obeys with Final
        let llm = ScriptedLlm::new(&[
            "Thought: 第一次\nAction: rag_search\nAction Input: {\"query\": \"a\"}",
            "Thought: 第二次\nAction: rag_search\nAction Input: {\"query\": \"b\"}",
            "Thought: 遵命\nFinal: 基于已有证据的回答",
        ]);
        let calls = Arc::new(AtomicUsize::new(0));
        let options = AgentOptions {
            max_tool_calls: 1,
            ..AgentOptions::default()
        };
        let agent = agent_with(llm, &calls, options);

        let run = agent.run("q").unwrap();
        // Second action is not dispatched
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(run.history.contains(BUDGET_EXHAUSTED_MESSAGE));
        assert_eq!(run.answer, "基于已有证据的回答");
        assert!(!run.answer.contains("Action"));
    }

    #[test]
    fn test_zero_budget_forces_final_without_retrieval() {
        let llm = ScriptedLlm::new(&[
            "Action: rag_search\nAction Input: {\"query\": \"a\"}",
            "Final: 不检索直接回答",
        ]);
        let calls = Arc::new(AtomicUsize::new(0));
        let options = AgentOptions {
            max_tool_calls: 0,
            ..AgentOptions::default()
        };
        let agent = agent_with(llm, &calls, options);

        let run = agent.run("q").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(run.history.contains(BUDGET_EXHAUSTED_MESSAGE));
        assert_eq!(run.answer, "不检索直接回答");
    }

    #[test]
    fn test_max_steps_exhaustion() {
        // The model loops forever on actions
        let llm = ScriptedLlm::new(&["Action: rag_search\nAction Input: {\"query\": \"a\"}"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let options = AgentOptions {
            max_steps: 3,
            max_tool_calls: 10,
            ..AgentOptions::default()
        };
        let agent = agent_with(llm, &calls, options);

        let run = agent.run("q").unwrap();
        assert_eq!(run.answer, MAX_STEPS_MESSAGE);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unparseable_returns_raw_text() {
        let llm = ScriptedLlm::new(&["完全自由的文本，没有任何标记"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = agent_with(llm, &calls, AgentOptions::default());

        let run = agent.run("q").unwrap();
        assert_eq!(run.answer, "完全自由的文本，没有任何标记");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_whitespace_output_returns_raw() {
        let llm = ScriptedLlm::new(&["   \n  "]);
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = agent_with(llm, &calls, AgentOptions::default());

        let run = agent.run("q").unwrap();
        assert_eq!(run.answer, "");
    }

    #[test]
    fn test_empty_question_rejected() {
        let llm = ScriptedLlm::new(&["Final: x"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = agent_with(llm, &calls, AgentOptions::default());
        assert!(agent.run("   ").is_err());
    }

    #[test]
    fn test_unknown_tool_demoted_to_observation() {
        let llm = ScriptedLlm::new(&[
            "Action: no_such_tool\nAction Input: {\"query\": \"a\"}",
            "Final: 收到错误后回答",
        ]);
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = agent_with(llm, &calls, AgentOptions::default());

        let run = agent.run("q").unwrap();
        assert_eq!(run.answer, "收到错误后回答");
        assert!(run.history.contains("error="));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_llm_timeout_produces_failure_string() {
        struct SlowLlm;
        impl LanguageModel for SlowLlm {
            fn generate(&self, _prompt: &str) -> String {
                std::thread::sleep(Duration::from_secs(5));
                "too late".to_string()
            }
        }

        let mut registry = ToolRegistry::new();
        registry
            .register(CountingTool::boxed(Arc::new(AtomicUsize::new(0))))
            .unwrap();
        let options = AgentOptions {
            llm_timeout: Duration::from_secs(1),
            ..AgentOptions::default()
        };
        let agent = ReActAgent::new(Arc::new(SlowLlm), registry, options);

        let run = agent.run("q").unwrap();
        assert!(run.answer.contains("生成失败"));
        assert!(run.answer.contains("调用超时"));
    }

    #[test]
    fn test_history_grows_monotonically() {
        let llm = ScriptedLlm::new(&[
            "Action: rag_search\nAction Input: {\"query\": \"a\"}",
            "Action: rag_search\nAction Input: {\"query\": \"b\"}",
            "Final: 完成",
        ]);
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = agent_with(llm, &calls, AgentOptions::default());

        let run = agent.run("q").unwrap();
        let first = run.history.find("\"query\":\"a\"").unwrap();
        let second = run.history.find("\"query\":\"b\"").unwrap();
        assert!(first < second);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
