//! ReAct tool-using agent.
//!
//! The loop drives `Thought → Action → Observation` rounds against a tool
//! registry, with hard budgets on steps and tool calls and a wall-clock
//! deadline on every LLM invocation.

pub mod parse;
pub mod prompts;
pub mod react;
pub mod tool;
pub mod tools;

pub use parse::{ReActOutcome, extract_first_json_value, parse_react};
pub use prompts::render_prompt;
pub use react::{AgentOptions, AgentRun, BUDGET_EXHAUSTED_MESSAGE, MAX_STEPS_MESSAGE, ReActAgent};
pub use tool::{Tool, ToolRegistry, ToolSpec};
pub use tools::{RagBackend, RagSearchTool, SearchOnlineTool, format_observation};
