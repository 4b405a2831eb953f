//! Conversation records: turns, tool calls, and tool results.
//!
//! History is an ordered list of [`Turn`]s, appended-to but never edited in
//! place. Assistant turns may carry tool calls; each tool-results turn pairs
//! 1:1 with the calls of the assistant turn before it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use llm::Usage;

/// One tool invocation emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Parsed arguments object.
    pub arguments: Value,
}

/// Result of executing one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    /// Post-truncation output; this is what enters history.
    pub output: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: output.into(),
            is_error: true,
        }
    }
}

/// Where a steering message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteeringSource {
    /// Queued by the host through `Session::steer`.
    Host,
    /// Injected by the loop detector.
    LoopDetection,
}

/// One conversation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    ToolResults {
        results: Vec<ToolResult>,
    },
    System {
        content: String,
    },
    Steering {
        content: String,
        source: SteeringSource,
    },
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Turn::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Turn::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
            usage: None,
        }
    }

    pub fn steering(content: impl Into<String>, source: SteeringSource) -> Self {
        Turn::Steering {
            content: content.into(),
            source,
        }
    }

    /// Whether this is a user or assistant turn (the pair counted against
    /// `max_turns`).
    pub fn counts_toward_turn_limit(&self) -> bool {
        matches!(self, Turn::User { .. } | Turn::Assistant { .. })
    }
}

/// The final assistant turn returned by `Session::process_input`.
#[derive(Debug, Clone, Default)]
pub struct AssistantTurn {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_constructors() {
        let ok = ToolResult::ok("c1", "fine");
        assert!(!ok.is_error);
        let err = ToolResult::error("c2", "boom");
        assert!(err.is_error);
        assert_eq!(err.tool_call_id, "c2");
    }

    #[test]
    fn turn_limit_counts_user_and_assistant_only() {
        assert!(Turn::user("u").counts_toward_turn_limit());
        assert!(Turn::assistant("a").counts_toward_turn_limit());
        assert!(!Turn::ToolResults { results: vec![] }.counts_toward_turn_limit());
        assert!(!Turn::steering("s", SteeringSource::Host).counts_toward_turn_limit());
        assert!(!Turn::System { content: "s".into() }.counts_toward_turn_limit());
    }

    #[test]
    fn turn_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Turn::user("hello")).expect("serialize");
        assert!(json.contains("\"kind\":\"user\""));
        let json = serde_json::to_string(&Turn::steering("watch out", SteeringSource::LoopDetection))
            .expect("serialize");
        assert!(json.contains("\"source\":\"loop_detection\""));
    }
}
