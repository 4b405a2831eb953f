//! Subagent wiring: bounded-depth child sessions driven by tools.
//!
//! A parent session below the depth cap exposes `spawn_agent`, `send_input`,
//! `wait`, and `close_agent`. Spawning constructs a child session with the
//! same client, profile, and environment at `depth + 1` and runs the task
//! synchronously. Children hold no reference back to the parent; the parent
//! keeps handles in a shared map the executors capture.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use llm::LlmClient;

use crate::config::SessionConfig;
use crate::environment::ExecutionEnvironment;
use crate::profile::ProviderProfile;
use crate::session::Session;
use crate::tools::{opt_u64, require_str, RegisteredTool, ToolDefinition, ToolError, ToolExecutor};
use crate::turns::Turn;

const DEFAULT_SUBAGENT_MAX_TURNS: u32 = 50;

/// Lifecycle of one subagent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAgentStatus {
    Running,
    Completed,
    Failed,
    Closed,
}

impl SubAgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubAgentStatus::Running => "running",
            SubAgentStatus::Completed => "completed",
            SubAgentStatus::Failed => "failed",
            SubAgentStatus::Closed => "closed",
        }
    }
}

/// Result of a finished subagent task.
#[derive(Debug, Clone)]
pub struct SubAgentResult {
    pub output: String,
    pub success: bool,
    pub turns_used: usize,
}

/// Handle to a child session held by the parent.
pub struct SubAgentHandle {
    pub id: String,
    pub session: Session,
    pub status: SubAgentStatus,
    pub result: Option<SubAgentResult>,
}

/// Map of subagent handles shared between a parent session and its tools.
#[derive(Clone, Default)]
pub struct SubagentShared {
    inner: Arc<tokio::sync::Mutex<HashMap<String, SubAgentHandle>>>,
}

impl SubagentShared {
    /// Status snapshot per subagent id.
    pub async fn statuses(&self) -> HashMap<String, String> {
        self.inner
            .lock()
            .await
            .iter()
            .map(|(id, h)| (id.clone(), h.status.as_str().to_string()))
            .collect()
    }
}

struct SpawnAgentExecutor {
    llm_client: Arc<dyn LlmClient>,
    profile: Arc<ProviderProfile>,
    env: Arc<dyn ExecutionEnvironment>,
    parent_config: SessionConfig,
    parent_depth: u32,
    shared: SubagentShared,
}

#[async_trait]
impl ToolExecutor for SpawnAgentExecutor {
    async fn execute(
        &self,
        arguments: &Value,
        _env: &dyn ExecutionEnvironment,
    ) -> Result<String, ToolError> {
        let task = require_str(arguments, "task")?;
        let max_turns = opt_u64(arguments, "max_turns")
            .map(|n| n as u32)
            .unwrap_or(DEFAULT_SUBAGENT_MAX_TURNS);

        let child_config = SessionConfig {
            max_turns,
            ..self.parent_config.clone()
        };
        let mut child = Session::with_config(
            self.llm_client.clone(),
            self.profile.clone(),
            self.env.clone(),
            child_config,
            self.parent_depth + 1,
        );
        let id = child.id.clone();
        tracing::debug!(subagent = %id, depth = self.parent_depth + 1, "spawning subagent");

        match child.process_input(task).await {
            Ok(turn) => {
                let turns_used = child
                    .history()
                    .iter()
                    .filter(|t| matches!(t, Turn::Assistant { .. }))
                    .count();
                let output = turn.content.clone();
                self.shared.inner.lock().await.insert(
                    id.clone(),
                    SubAgentHandle {
                        id: id.clone(),
                        session: child,
                        status: SubAgentStatus::Completed,
                        result: Some(SubAgentResult {
                            output: output.clone(),
                            success: true,
                            turns_used,
                        }),
                    },
                );
                Ok(format!("Agent {} completed. Output:\n{}", id, output))
            }
            Err(e) => {
                self.shared.inner.lock().await.insert(
                    id.clone(),
                    SubAgentHandle {
                        id: id.clone(),
                        session: child,
                        status: SubAgentStatus::Failed,
                        result: Some(SubAgentResult {
                            output: e.to_string(),
                            success: false,
                            turns_used: 0,
                        }),
                    },
                );
                Ok(format!("Agent {} failed: {}", id, e))
            }
        }
    }
}

struct SendInputExecutor {
    shared: SubagentShared,
}

#[async_trait]
impl ToolExecutor for SendInputExecutor {
    async fn execute(
        &self,
        arguments: &Value,
        _env: &dyn ExecutionEnvironment,
    ) -> Result<String, ToolError> {
        let agent_id = require_str(arguments, "agent_id")?;
        let message = require_str(arguments, "message")?;

        let mut agents = self.shared.inner.lock().await;
        let Some(handle) = agents.get_mut(agent_id) else {
            return Ok(format!("Unknown agent: {}", agent_id));
        };
        if matches!(handle.status, SubAgentStatus::Failed | SubAgentStatus::Closed) {
            return Ok(format!(
                "Agent {} is {}, cannot send input",
                agent_id,
                handle.status.as_str()
            ));
        }
        match handle.session.process_input(message).await {
            Ok(turn) => Ok(format!("Agent {} responded:\n{}", agent_id, turn.content)),
            Err(e) => {
                handle.status = SubAgentStatus::Failed;
                Ok(format!("Agent {} failed: {}", agent_id, e))
            }
        }
    }
}

struct WaitExecutor {
    shared: SubagentShared,
}

#[async_trait]
impl ToolExecutor for WaitExecutor {
    async fn execute(
        &self,
        arguments: &Value,
        _env: &dyn ExecutionEnvironment,
    ) -> Result<String, ToolError> {
        let agent_id = require_str(arguments, "agent_id")?;
        let agents = self.shared.inner.lock().await;
        let Some(handle) = agents.get(agent_id) else {
            return Ok(format!("Unknown agent: {}", agent_id));
        };
        match &handle.result {
            Some(result) => Ok(format!(
                "Agent {} {}. Output:\n{}\nTurns used: {}",
                agent_id,
                handle.status.as_str(),
                result.output,
                result.turns_used
            )),
            None => Ok(format!(
                "Agent {} is still {}",
                agent_id,
                handle.status.as_str()
            )),
        }
    }
}

struct CloseAgentExecutor {
    shared: SubagentShared,
}

#[async_trait]
impl ToolExecutor for CloseAgentExecutor {
    async fn execute(
        &self,
        arguments: &Value,
        _env: &dyn ExecutionEnvironment,
    ) -> Result<String, ToolError> {
        let agent_id = require_str(arguments, "agent_id")?;
        let mut agents = self.shared.inner.lock().await;
        let Some(handle) = agents.get_mut(agent_id) else {
            return Ok(format!("Unknown agent: {}", agent_id));
        };
        handle.session.close();
        handle.status = SubAgentStatus::Closed;
        Ok(format!("Agent {} closed", agent_id))
    }
}

fn spawn_definition() -> ToolDefinition {
    ToolDefinition {
        name: "spawn_agent".to_string(),
        description: "Spawn a subagent to handle a scoped task autonomously.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "task": {"type": "string", "description": "Natural language task description"},
                "max_turns": {"type": "integer", "description": "Turn limit (default: 50)"}
            },
            "required": ["task"]
        }),
    }
}

fn send_input_definition() -> ToolDefinition {
    ToolDefinition {
        name: "send_input".to_string(),
        description: "Send a message to a spawned subagent.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string", "description": "Subagent ID"},
                "message": {"type": "string", "description": "Message to send"}
            },
            "required": ["agent_id", "message"]
        }),
    }
}

fn wait_definition() -> ToolDefinition {
    ToolDefinition {
        name: "wait".to_string(),
        description: "Report a subagent's status and final output.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string", "description": "Subagent ID"}
            },
            "required": ["agent_id"]
        }),
    }
}

fn close_definition() -> ToolDefinition {
    ToolDefinition {
        name: "close_agent".to_string(),
        description: "Terminate a subagent.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string", "description": "Subagent ID"}
            },
            "required": ["agent_id"]
        }),
    }
}

/// Builds the subagent tools for a parent at `depth`.
///
/// Returns an empty list at or beyond `config.max_subagent_depth`, so
/// sessions at the cap cannot nest further.
pub fn make_subagent_tools(
    llm_client: Arc<dyn LlmClient>,
    profile: Arc<ProviderProfile>,
    env: Arc<dyn ExecutionEnvironment>,
    config: &SessionConfig,
    depth: u32,
    shared: SubagentShared,
) -> Vec<RegisteredTool> {
    if depth >= config.max_subagent_depth {
        return Vec::new();
    }
    vec![
        RegisteredTool::new(
            spawn_definition(),
            Arc::new(SpawnAgentExecutor {
                llm_client,
                profile,
                env,
                parent_config: config.clone(),
                parent_depth: depth,
                shared: shared.clone(),
            }),
        ),
        RegisteredTool::new(
            send_input_definition(),
            Arc::new(SendInputExecutor {
                shared: shared.clone(),
            }),
        ),
        RegisteredTool::new(
            wait_definition(),
            Arc::new(WaitExecutor {
                shared: shared.clone(),
            }),
        ),
        RegisteredTool::new(close_definition(), Arc::new(CloseAgentExecutor { shared })),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::LocalExecutionEnvironment;
    use llm::MockClient;

    fn parts() -> (
        Arc<dyn LlmClient>,
        Arc<ProviderProfile>,
        Arc<dyn ExecutionEnvironment>,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let env: Arc<dyn ExecutionEnvironment> = Arc::new(
            LocalExecutionEnvironment::with_working_dir(dir.path().display().to_string()),
        );
        (
            Arc::new(MockClient::with_text("child says hi")),
            Arc::new(ProviderProfile::new("anthropic", "m", "base")),
            env,
            dir,
        )
    }

    #[test]
    fn depth_cap_yields_no_tools() {
        let (llm_client, profile, env, _dir) = parts();
        let config = SessionConfig {
            max_subagent_depth: 2,
            ..Default::default()
        };
        let at_cap = make_subagent_tools(
            llm_client.clone(),
            profile.clone(),
            env.clone(),
            &config,
            2,
            SubagentShared::default(),
        );
        assert!(at_cap.is_empty());
        let below = make_subagent_tools(
            llm_client,
            profile,
            env,
            &config,
            1,
            SubagentShared::default(),
        );
        assert_eq!(below.len(), 4);
    }

    #[tokio::test]
    async fn spawn_runs_child_and_records_handle() {
        let (llm_client, profile, env, _dir) = parts();
        let shared = SubagentShared::default();
        let spawn = SpawnAgentExecutor {
            llm_client,
            profile,
            env: env.clone(),
            parent_config: SessionConfig::default(),
            parent_depth: 0,
            shared: shared.clone(),
        };
        let out = spawn
            .execute(&json!({"task": "summarize"}), env.as_ref())
            .await
            .expect("spawn");
        assert!(out.contains("completed"));
        assert!(out.contains("child says hi"));
        let statuses = shared.statuses().await;
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses.values().next().map(String::as_str), Some("completed"));
    }

    #[tokio::test]
    async fn wait_reports_result_and_close_transitions() {
        let (llm_client, profile, env, _dir) = parts();
        let shared = SubagentShared::default();
        let spawn = SpawnAgentExecutor {
            llm_client,
            profile,
            env: env.clone(),
            parent_config: SessionConfig::default(),
            parent_depth: 0,
            shared: shared.clone(),
        };
        spawn
            .execute(&json!({"task": "t"}), env.as_ref())
            .await
            .expect("spawn");
        let id = shared.statuses().await.keys().next().cloned().expect("id");

        let wait = WaitExecutor {
            shared: shared.clone(),
        };
        let out = wait
            .execute(&json!({ "agent_id": id }), env.as_ref())
            .await
            .expect("wait");
        assert!(out.contains("Turns used:"));

        let close = CloseAgentExecutor {
            shared: shared.clone(),
        };
        let out = close
            .execute(&json!({ "agent_id": id }), env.as_ref())
            .await
            .expect("close");
        assert!(out.contains("closed"));
        assert_eq!(
            shared.statuses().await.values().next().map(String::as_str),
            Some("closed")
        );
    }

    #[tokio::test]
    async fn unknown_agent_is_soft_error() {
        let (_llm, _profile, env, _dir) = parts();
        let wait = WaitExecutor {
            shared: SubagentShared::default(),
        };
        let out = wait
            .execute(&json!({"agent_id": "ghost"}), env.as_ref())
            .await
            .expect("wait");
        assert_eq!(out, "Unknown agent: ghost");
    }
}
