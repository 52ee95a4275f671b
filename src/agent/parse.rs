//! ReAct output parsing.
//!
//! Model output parses into a tagged outcome: a final answer, a tool
//! action, or raw text when neither marker is present. `Final` wins over
//! `Action` when both appear. Recognizers are line-anchored and
//! case-insensitive; `Action Input` accepts the first complete JSON value
//! after the marker, across newlines and inside code fences.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

#[allow(clippy::unwrap_used)]
static THOUGHT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?mi)^\s*Thought\s*:\s*(.+?)\s*$").unwrap());
#[allow(clippy::unwrap_used)]
static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?mi)^\s*Action\s*:\s*(.+?)\s*$").unwrap());
#[allow(clippy::unwrap_used)]
static FINAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?mi)^\s*Final\s*:\s*").unwrap());
#[allow(clippy::unwrap_used)]
static ACTION_INPUT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?mi)^\s*Action Input\s*:\s*").unwrap());

/// Parsed model output.
#[derive(Debug, Clone, PartialEq)]
pub enum ReActOutcome {
    /// The model produced its final answer.
    Final {
        /// Everything after the `Final:` marker, trimmed.
        answer: String,
    },
    /// The model requested a tool call.
    Action {
        /// The step's thought line, possibly empty.
        thought: String,
        /// Requested tool name.
        name: String,
        /// Parsed `Action Input` object; `None` when absent or not a JSON
        /// object.
        input: Option<Map<String, Value>>,
    },
    /// Neither marker parsed; the loop returns this text as the answer.
    Raw {
        /// The unparsed model output.
        text: String,
    },
}

/// Extracts the first complete JSON value (object or array) starting at or
/// after `start`, honoring string literals and escapes, across newlines.
#[must_use]
pub fn extract_first_json_value(text: &str, start: usize) -> Option<&str> {
    let tail = text.get(start..)?;

    let brace = tail.find('{');
    let bracket = tail.find('[');
    let (begin, open, close) = match (brace, bracket) {
        (None, None) => return None,
        (Some(b), None) => (b, '{', '}'),
        (None, Some(b)) => (b, '[', ']'),
        (Some(b), Some(k)) => {
            if b < k {
                (b, '{', '}')
            } else {
                (k, '[', ']')
            }
        }
    };

    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;
    for (offset, ch) in tail[begin..].char_indices() {
        if in_str {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_str = false;
            }
            continue;
        }
        match ch {
            '"' => in_str = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(tail[begin..=begin + offset].trim());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses model output into a [`ReActOutcome`].
#[must_use]
pub fn parse_react(text: &str) -> ReActOutcome {
    if let Some(found) = FINAL_RE.find(text) {
        return ReActOutcome::Final {
            answer: text[found.end()..].trim().to_string(),
        };
    }

    let thought = THOUGHT_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let Some(name) = ACTION_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|n| !n.is_empty())
    else {
        return ReActOutcome::Raw {
            text: text.to_string(),
        };
    };

    let input = ACTION_INPUT_RE
        .find(text)
        .and_then(|found| extract_first_json_value(text, found.end()))
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        });

    ReActOutcome::Action {
        thought,
        name,
        input,
    }
}
