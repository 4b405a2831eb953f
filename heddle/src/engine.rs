//! Pipeline execution engine: traverses the graph and runs node handlers.
//!
//! The engine owns one run: it mirrors graph attributes into the context,
//! writes the run manifest, executes handlers under their retry policies,
//! records per-stage status files, saves a checkpoint after every stage,
//! routes through the edge selector, and enforces goal gates at exit nodes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::checkpoint::Checkpoint;
use crate::context::Context;
use crate::edge_selector::select_edge;
use crate::error::EngineError;
use crate::events::{EventBus, PipelineEvent};
use crate::graph::{Graph, Node};
use crate::handler::HandlerRegistry;
use crate::outcome::{Outcome, Status};
use crate::retry::{build_retry_policy, RetryPolicy};

/// Pipeline execution engine.
///
/// Construct with [`Engine::new`], wire optional collaborators through the
/// builder methods, then call [`Engine::run`]. One engine value is one run.
pub struct Engine {
    graph: Graph,
    registry: HandlerRegistry,
    context: Context,
    bus: Arc<EventBus>,
    logs_root: PathBuf,
    checkpoint: Option<Checkpoint>,

    completed_nodes: Vec<String>,
    node_outcomes: HashMap<String, Outcome>,
    node_retries: HashMap<String, u32>,
}

impl Engine {
    /// Creates an engine with a fresh context, a private event bus, and a
    /// timestamped logs root under `heddle-runs/`.
    pub fn new(graph: Graph, registry: HandlerRegistry) -> Self {
        let logs_root = PathBuf::from(format!(
            "heddle-runs/{}",
            Utc::now().format("%Y%m%dT%H%M%S")
        ));
        Self {
            graph,
            registry,
            context: Context::new(),
            bus: Arc::new(EventBus::new()),
            logs_root,
            checkpoint: None,
            completed_nodes: Vec::new(),
            node_outcomes: HashMap::new(),
            node_retries: HashMap::new(),
        }
    }

    /// Uses a caller-seeded context (builder).
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Uses a shared event bus (builder).
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    /// Writes run artifacts under the given root (builder).
    pub fn with_logs_root(mut self, logs_root: impl Into<PathBuf>) -> Self {
        self.logs_root = logs_root.into();
        self
    }

    /// Resumes from a previously saved checkpoint (builder).
    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// The run context (graph attribute mirrors plus live keys).
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Node ids completed so far, in completion order.
    pub fn completed_nodes(&self) -> &[String] {
        &self.completed_nodes
    }

    /// Executes the full pipeline and returns the terminal outcome.
    pub async fn run(&mut self) -> Result<Outcome, EngineError> {
        std::fs::create_dir_all(&self.logs_root)?;

        // Mirror graph attributes into the context before anything runs.
        self.context.set("graph.goal", self.graph.goal());
        for (key, value) in &self.graph.attributes {
            self.context.set(format!("graph.{}", key), value.clone());
        }

        self.write_manifest()?;
        self.bus.emit(&PipelineEvent::PipelineStarted {
            graph_name: self.graph.name.clone(),
        });

        if let Some(cp) = self.checkpoint.take() {
            self.restore_checkpoint(cp);
        }

        let start_id = self
            .graph
            .start_node()
            .map(|n| n.id.clone())
            .ok_or(EngineError::NoStartNode)?;

        let mut current_id = if self.completed_nodes.is_empty() {
            start_id
        } else {
            self.resume_node_id().unwrap_or(start_id)
        };

        let mut last_outcome = Outcome::success();

        loop {
            let node = self
                .graph
                .node(&current_id)
                .ok_or_else(|| EngineError::UnknownNode(current_id.clone()))?
                .clone();

            // Terminal node: goal gates decide whether the exit is accepted.
            if node.is_exit() {
                if let Some(failed_gate) = self.first_failed_gate() {
                    match self.gate_retry_target(&failed_gate) {
                        Some(target) if self.graph.nodes.contains_key(&target) => {
                            tracing::info!(gate = %failed_gate, retry_target = %target, "goal gate failed; rerouting");
                            current_id = target;
                            continue;
                        }
                        _ => {
                            self.bus.emit(&PipelineEvent::PipelineFailed {
                                graph_name: self.graph.name.clone(),
                                error: format!(
                                    "Goal gate unsatisfied on {} and no retry target",
                                    failed_gate
                                ),
                            });
                            return Ok(Outcome::fail("Goal gate unsatisfied"));
                        }
                    }
                }
                self.bus.emit(&PipelineEvent::PipelineCompleted {
                    graph_name: self.graph.name.clone(),
                    outcome: last_outcome.clone(),
                });
                return Ok(last_outcome);
            }

            self.bus.emit(&PipelineEvent::StageStarted {
                node_id: node.id.clone(),
            });
            self.context.set("current_node", node.id.clone());

            let policy = build_retry_policy(&node, &self.graph);
            let outcome = self.execute_with_retry(&node, &policy).await?;
            last_outcome = outcome.clone();

            self.completed_nodes.push(node.id.clone());
            self.node_outcomes.insert(node.id.clone(), outcome.clone());
            self.bus.emit(&PipelineEvent::StageCompleted {
                node_id: node.id.clone(),
                outcome: outcome.clone(),
            });

            self.context.apply_updates(&outcome.context_updates);
            self.context.set("outcome", outcome.status.as_str());
            if !outcome.preferred_label.is_empty() {
                self.context
                    .set("preferred_label", outcome.preferred_label.clone());
            }

            let cp = Checkpoint::create_now(
                node.id.clone(),
                self.completed_nodes.clone(),
                self.node_retries.clone(),
                self.context.snapshot(),
            );
            let cp_path = self.logs_root.join("checkpoint.json");
            cp.save(&cp_path)?;
            self.bus.emit(&PipelineEvent::CheckpointSaved {
                node_id: node.id.clone(),
                path: cp_path.display().to_string(),
            });

            let outgoing = self.graph.outgoing(&node.id);
            let next_edge = select_edge(&outgoing, &outcome, &self.context);

            match next_edge {
                None => {
                    if outcome.status == Status::Fail {
                        self.bus.emit(&PipelineEvent::PipelineFailed {
                            graph_name: self.graph.name.clone(),
                            error: format!(
                                "Stage {} failed with no outgoing fail edge",
                                node.id
                            ),
                        });
                    }
                    return Ok(outcome);
                }
                Some(edge) => {
                    if edge.loop_restart {
                        // Restart semantics beyond advancing are not
                        // implemented; tracking is kept as-is.
                        tracing::debug!(from = %edge.from_node, to = %edge.to_node, "loop_restart edge taken");
                    }
                    current_id = edge.to_node.clone();
                }
            }
        }
    }

    /// Executes one node under its retry policy.
    ///
    /// Handler errors consume attempts and end as FAIL; RETRY outcomes
    /// consume attempts and end as PARTIAL_SUCCESS when the node allows
    /// partial, FAIL otherwise. SUCCESS/PARTIAL_SUCCESS clear the node's
    /// retry count. The stage status file is written for every terminal
    /// outcome.
    async fn execute_with_retry(
        &mut self,
        node: &Node,
        policy: &RetryPolicy,
    ) -> Result<Outcome, EngineError> {
        let handler = self.registry.resolve(node)?;
        let stage_dir = self.logs_root.join(&node.id);
        std::fs::create_dir_all(&stage_dir)?;

        for attempt in 1..=policy.max_attempts {
            let result = handler
                .execute(node, &self.context, &self.graph, &stage_dir)
                .await;

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(node = %node.id, attempt, error = %err, "handler error");
                    if attempt < policy.max_attempts {
                        self.sleep_before_retry(node, attempt, policy).await;
                        continue;
                    }
                    let outcome = Outcome::fail(err.to_string());
                    self.write_status(&stage_dir, &outcome)?;
                    return Ok(outcome);
                }
            };

            match outcome.status {
                Status::Success | Status::PartialSuccess => {
                    self.node_retries.remove(&node.id);
                    self.write_status(&stage_dir, &outcome)?;
                    return Ok(outcome);
                }
                Status::Retry => {
                    if attempt < policy.max_attempts {
                        *self.node_retries.entry(node.id.clone()).or_insert(0) += 1;
                        self.sleep_before_retry(node, attempt, policy).await;
                        continue;
                    }
                    let outcome = if node.allow_partial {
                        Outcome::new(Status::PartialSuccess)
                            .with_notes("retries exhausted, partial accepted")
                    } else {
                        Outcome::fail("max retries exceeded")
                    };
                    self.write_status(&stage_dir, &outcome)?;
                    return Ok(outcome);
                }
                Status::Fail | Status::Skipped => {
                    self.write_status(&stage_dir, &outcome)?;
                    return Ok(outcome);
                }
            }
        }

        let outcome = Outcome::fail("max retries exceeded");
        self.write_status(&stage_dir, &outcome)?;
        Ok(outcome)
    }

    async fn sleep_before_retry(&self, node: &Node, attempt: u32, policy: &RetryPolicy) {
        let delay = policy.delay_for_attempt(attempt);
        self.bus.emit(&PipelineEvent::StageRetrying {
            node_id: node.id.clone(),
            attempt,
            delay_ms: delay.as_millis() as u64,
        });
        tokio::time::sleep(delay).await;
    }

    /// First completed goal-gate node whose recorded outcome is not
    /// success-like, in completion order.
    fn first_failed_gate(&self) -> Option<String> {
        for node_id in &self.completed_nodes {
            let node = match self.graph.node(node_id) {
                Some(n) => n,
                None => continue,
            };
            if !node.goal_gate {
                continue;
            }
            match self.node_outcomes.get(node_id) {
                // SKIPPED does not satisfy a gate.
                Some(outcome) if outcome.status.is_ok() => {}
                _ => return Some(node_id.clone()),
            }
        }
        None
    }

    /// Retry target for a failed gate: node targets first, then the
    /// graph-level attributes.
    fn gate_retry_target(&self, node_id: &str) -> Option<String> {
        let node = self.graph.node(node_id)?;
        if let Some(t) = &node.retry_target {
            return Some(t.clone());
        }
        if let Some(t) = &node.fallback_retry_target {
            return Some(t.clone());
        }
        for key in ["retry_target", "fallback_retry_target"] {
            if let Some(t) = self.graph.attributes.get(key) {
                if !t.is_empty() {
                    return Some(t.clone());
                }
            }
        }
        None
    }

    fn write_manifest(&self) -> Result<(), EngineError> {
        let manifest = json!({
            "name": self.graph.name,
            "goal": self.graph.goal(),
            "started_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        std::fs::write(
            self.logs_root.join("manifest.json"),
            serde_json::to_vec_pretty(&manifest)?,
        )?;
        Ok(())
    }

    fn write_status(&self, stage_dir: &Path, outcome: &Outcome) -> Result<(), EngineError> {
        let status = json!({
            "outcome": outcome.status.as_str(),
            "preferred_next_label": outcome.preferred_label,
            "suggested_next_ids": outcome.suggested_next_ids,
            "context_updates": outcome.context_updates,
            "notes": outcome.notes,
        });
        std::fs::write(
            stage_dir.join("status.json"),
            serde_json::to_vec_pretty(&status)?,
        )?;
        Ok(())
    }

    fn restore_checkpoint(&mut self, cp: Checkpoint) {
        self.completed_nodes = cp.completed_nodes;
        self.node_retries = cp.node_retries;
        self.context.apply_updates(&cp.context_values);
    }

    /// Resume point after a checkpoint restore: the first successor of the
    /// last completed node, in its outgoing-edge order.
    fn resume_node_id(&self) -> Option<String> {
        let last = self.completed_nodes.last()?;
        self.graph
            .outgoing(last)
            .first()
            .map(|e| e.to_node.clone())
    }
}
