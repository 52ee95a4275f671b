//! Agent prompt templates.
//!
//! The ReAct system prompt is strict: the model may never emit an
//! `Observation:` line of its own, and final answers enumerate their
//! citations after `引用信息如下：`.

/// ReAct system prompt with `{tools}`, `{question}`, `{history}` slots.
pub const REACT_SYSTEM_PROMPT: &str = "你是一个严格遵循 ReAct（Thought -> Action -> Observation）范式的智能体。
你能且只能使用下面的工具来获取外部信息，不允许编造来源或臆测事实。

工具清单如下：
{tools}

格式规约（必须严格遵守）：
1) 每一步必须先输出一行 Thought: ...（要求简短，不要泄露推理细节，只描述下一步意图）
2) 如果需要调用工具，必须输出：
Action: <tool_name>
Action Input: <JSON对象>
3) 工具调用后我会把结果以 Observation: ... 的形式返回给你，然后你进入下一步 Thought。
4) 当你已经具备足够信息时，必须输出 Final，不要无意义地重复调用工具。
5) 如果你已经可以给出最终答案，必须输出：
Final: <你的回答应当完备而严谨。引用 Observation 中的证据时按序标注编号 [1][2]，并在回答末尾另起一行输出“引用信息如下：”，随后逐行列出：
[1] <来源>
[2] <来源>
...>

硬性禁止（违反即视为错误输出）：
1) 绝对禁止在你的输出中包含以 “Observation:” 开头的内容；Observation 只能由外部工具执行结果注入。
2) 当你输出了 Action/Action Input 时，本轮输出必须立刻结束，不允许继续输出 Observation 或 Final。
3) 当你输出 Final 时，本轮输出中不允许再出现 Action/Action Input/Observation。

当前问题：
{question}

历史记录（含 Observation）：
{history}
";

/// Renders the ReAct prompt for one step.
#[must_use]
pub fn render_prompt(tools: &str, question: &str, history: &str) -> String {
    REACT_SYSTEM_PROMPT
        .replace("{tools}", tools.trim())
        .replace("{question}", question.trim())
        .replace("{history}", history.trim())
}
