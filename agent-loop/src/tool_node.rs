//! Tool handler: pipeline nodes that run one shell command.
//!
//! Parallelogram (`tool`) nodes execute the command in their `command`
//! attribute against the execution environment. Exit 0 maps to SUCCESS with
//! the stdout recorded in the context; anything else maps to FAIL carrying
//! the stderr.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use heddle::{Context, Graph, Handler, HandlerError, Node, Outcome};

use crate::environment::ExecutionEnvironment;

const DEFAULT_TOOL_TIMEOUT_MS: u64 = 120_000;

/// Runs a node's `command` attribute as a shell command.
pub struct ToolHandler {
    env: Arc<dyn ExecutionEnvironment>,
}

impl ToolHandler {
    pub fn new(env: Arc<dyn ExecutionEnvironment>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Handler for ToolHandler {
    async fn execute(
        &self,
        node: &Node,
        _ctx: &Context,
        _graph: &Graph,
        stage_dir: &Path,
    ) -> Result<Outcome, HandlerError> {
        let Some(command) = node.attributes.get("command") else {
            return Err(HandlerError::msg(format!(
                "tool node `{}` has no command attribute",
                node.id
            )));
        };

        let timeout_ms = node
            .timeout
            .map(|t| t.as_millis() as u64)
            .or_else(|| {
                node.attributes
                    .get("timeout_ms")
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(DEFAULT_TOOL_TIMEOUT_MS);

        tracing::info!(node = %node.id, command = %command, "tool stage");
        let result = self
            .env
            .exec_command(command, timeout_ms)
            .await
            .map_err(|e| HandlerError::msg(e.to_string()))?;

        std::fs::write(stage_dir.join("stdout.log"), &result.stdout)?;
        if !result.stderr.is_empty() {
            std::fs::write(stage_dir.join("stderr.log"), &result.stderr)?;
        }

        if result.exit_code == 0 && !result.timed_out {
            Ok(Outcome::success()
                .with_context_update(format!("{}.stdout", node.id), result.stdout.clone())
                .with_notes(format!("exit code 0 in {}ms", result.duration_ms)))
        } else {
            let reason = if result.timed_out {
                format!("command timed out after {}ms", timeout_ms)
            } else {
                format!("command exited with code {}", result.exit_code)
            };
            let mut outcome = Outcome::fail(reason);
            if !result.stderr.is_empty() {
                outcome.notes = result.stderr.clone();
            }
            Ok(outcome)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::LocalExecutionEnvironment;
    use heddle::Status;

    fn handler(dir: &Path) -> ToolHandler {
        ToolHandler::new(Arc::new(LocalExecutionEnvironment::with_working_dir(
            dir.display().to_string(),
        )))
    }

    fn tool_node(command: &str) -> Node {
        let mut node = Node::new("step");
        node.shape = "parallelogram".to_string();
        node.attributes
            .insert("command".to_string(), command.to_string());
        node
    }

    #[tokio::test]
    async fn successful_command_records_stdout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = handler(dir.path())
            .execute(
                &tool_node("echo payload"),
                &Context::new(),
                &Graph::new("g"),
                dir.path(),
            )
            .await
            .expect("execute");
        assert_eq!(out.status, Status::Success);
        let stdout = out
            .context_updates
            .get("step.stdout")
            .and_then(|v| v.as_str())
            .expect("stdout update");
        assert!(stdout.contains("payload"));
        assert!(dir.path().join("stdout.log").exists());
    }

    #[tokio::test]
    async fn nonzero_exit_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = handler(dir.path())
            .execute(
                &tool_node("echo oops >&2; exit 2"),
                &Context::new(),
                &Graph::new("g"),
                dir.path(),
            )
            .await
            .expect("execute");
        assert_eq!(out.status, Status::Fail);
        assert!(out.failure_reason.contains("code 2"));
        assert!(out.notes.contains("oops"));
    }

    #[tokio::test]
    async fn missing_command_is_handler_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut node = Node::new("bare");
        node.shape = "parallelogram".to_string();
        let err = handler(dir.path())
            .execute(&node, &Context::new(), &Graph::new("g"), dir.path())
            .await
            .expect_err("no command");
        assert!(err.to_string().contains("no command"));
    }
}
