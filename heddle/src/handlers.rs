//! Built-in node handlers: start, exit, conditional, and wait.human.
//!
//! The codergen handler for box nodes lives in the agent-loop crate; these
//! cover the structural shapes every pipeline uses.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::HandlerError;
use crate::graph::{Graph, Node};
use crate::handler::{Handler, HandlerRegistry};
use crate::interviewer::{Answer, Choice, Interviewer, Question, QuestionKind};
use crate::outcome::{Outcome, Status};

/// Handler for the start shape: a no-op that begins the run.
pub struct StartHandler;

#[async_trait]
impl Handler for StartHandler {
    async fn execute(
        &self,
        _node: &Node,
        _ctx: &Context,
        _graph: &Graph,
        _stage_dir: &Path,
    ) -> Result<Outcome, HandlerError> {
        Ok(Outcome::success())
    }
}

/// Handler for exit shapes. The engine intercepts exit nodes before
/// execution, so this only runs when an exit is registered as a plain type.
pub struct ExitHandler;

#[async_trait]
impl Handler for ExitHandler {
    async fn execute(
        &self,
        _node: &Node,
        _ctx: &Context,
        _graph: &Graph,
        _stage_dir: &Path,
    ) -> Result<Outcome, HandlerError> {
        Ok(Outcome::success())
    }
}

/// Handler for diamond (conditional) nodes.
///
/// Branching is the edge selector's job; the node itself just succeeds so
/// the guard conditions on its outgoing edges decide the route.
pub struct ConditionalHandler;

#[async_trait]
impl Handler for ConditionalHandler {
    async fn execute(
        &self,
        _node: &Node,
        _ctx: &Context,
        _graph: &Graph,
        _stage_dir: &Path,
    ) -> Result<Outcome, HandlerError> {
        Ok(Outcome::success())
    }
}

/// Handler for hexagon (wait.human) nodes: asks the interviewer and turns
/// the answer into a routing hint.
///
/// Options are the labels of the node's outgoing edges; the chosen label
/// becomes `preferred_label` so the edge selector follows it. A timeout maps
/// to RETRY (the retry policy governs how often the human is re-asked), a
/// skip to SKIPPED.
pub struct WaitHumanHandler {
    interviewer: Arc<dyn Interviewer>,
}

impl WaitHumanHandler {
    pub fn new(interviewer: Arc<dyn Interviewer>) -> Self {
        Self { interviewer }
    }
}

#[async_trait]
impl Handler for WaitHumanHandler {
    async fn execute(
        &self,
        node: &Node,
        _ctx: &Context,
        graph: &Graph,
        _stage_dir: &Path,
    ) -> Result<Outcome, HandlerError> {
        let text = if node.prompt.is_empty() {
            node.label.clone()
        } else {
            node.prompt.clone()
        };

        let options: Vec<Choice> = graph
            .outgoing(&node.id)
            .into_iter()
            .filter(|e| !e.label.is_empty())
            .map(|e| Choice {
                key: String::new(),
                label: e.label.clone(),
            })
            .collect();

        let mut question = if options.is_empty() {
            Question::free_form(node.id.clone(), text)
        } else {
            Question::multiple_choice(node.id.clone(), text, options)
        };
        question.kind = match node.attributes.get("question_kind").map(String::as_str) {
            Some("yes_no") => QuestionKind::YesNo,
            Some("confirmation") => QuestionKind::Confirmation,
            _ => question.kind,
        };
        question.default = node.attributes.get("default").cloned();
        question.timeout = node.timeout;

        let answer = self
            .interviewer
            .ask(&question)
            .await
            .map_err(|e| HandlerError::msg(e.to_string()))?;

        Ok(match answer {
            Answer::Yes => Outcome::success().with_preferred_label("Yes"),
            Answer::No => Outcome::success().with_preferred_label("No"),
            Answer::Option(label) => Outcome::success().with_preferred_label(label),
            Answer::Text(text) => Outcome::success()
                .with_context_update("human_response", text.clone())
                .with_notes(text),
            Answer::Timeout => {
                let mut o = Outcome::retry();
                o.failure_reason = "interview timed out".to_string();
                o
            }
            Answer::Skipped => Outcome::new(Status::Skipped),
        })
    }
}

/// Registers the built-in structural handlers onto a registry.
///
/// Registers `start`, `exit`, and `conditional`; adds `wait.human` when an
/// interviewer is supplied. The caller wires codergen (or a default) itself.
pub fn register_builtin_handlers(
    registry: &mut HandlerRegistry,
    interviewer: Option<Arc<dyn Interviewer>>,
) {
    registry.register("start", Arc::new(StartHandler));
    registry.register("exit", Arc::new(ExitHandler));
    registry.register("conditional", Arc::new(ConditionalHandler));
    if let Some(interviewer) = interviewer {
        registry.register("wait.human", Arc::new(WaitHumanHandler::new(interviewer)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Edge;
    use crate::interviewer::ScriptedInterviewer;

    fn review_graph() -> Graph {
        let mut g = Graph::new("g");
        let mut gate = Node::new("gate");
        gate.shape = "hexagon".to_string();
        gate.prompt = "Approve the plan?".to_string();
        g.nodes.insert("gate".to_string(), gate);
        g.nodes.insert("ok".to_string(), Node::new("ok"));
        g.nodes.insert("redo".to_string(), Node::new("redo"));
        let mut yes = Edge::new("gate", "ok");
        yes.label = "[A] Approve".to_string();
        let mut no = Edge::new("gate", "redo");
        no.label = "[R] Reject".to_string();
        g.edges.push(yes);
        g.edges.push(no);
        g
    }

    #[tokio::test]
    async fn start_handler_succeeds() {
        let h = StartHandler;
        let out = h
            .execute(&Node::new("s"), &Context::new(), &Graph::new("g"), Path::new("/tmp"))
            .await
            .expect("execute");
        assert_eq!(out.status, Status::Success);
    }

    #[tokio::test]
    async fn wait_human_chosen_option_becomes_preferred_label() {
        let g = review_graph();
        let h = WaitHumanHandler::new(Arc::new(ScriptedInterviewer::new([Answer::Option(
            "[A] Approve".to_string(),
        )])));
        let out = h
            .execute(&g.nodes["gate"], &Context::new(), &g, Path::new("/tmp"))
            .await
            .expect("execute");
        assert_eq!(out.status, Status::Success);
        assert_eq!(out.preferred_label, "[A] Approve");
    }

    #[tokio::test]
    async fn wait_human_timeout_maps_to_retry() {
        let g = review_graph();
        let h = WaitHumanHandler::new(Arc::new(ScriptedInterviewer::new([Answer::Timeout])));
        let out = h
            .execute(&g.nodes["gate"], &Context::new(), &g, Path::new("/tmp"))
            .await
            .expect("execute");
        assert_eq!(out.status, Status::Retry);
        assert!(out.failure_reason.contains("timed out"));
    }

    #[tokio::test]
    async fn wait_human_free_text_recorded_in_context_updates() {
        let mut g = review_graph();
        g.edges.clear();
        let h = WaitHumanHandler::new(Arc::new(ScriptedInterviewer::new([Answer::Text(
            "ship it".to_string(),
        )])));
        let out = h
            .execute(&g.nodes["gate"], &Context::new(), &g, Path::new("/tmp"))
            .await
            .expect("execute");
        assert_eq!(
            out.context_updates.get("human_response"),
            Some(&serde_json::Value::from("ship it"))
        );
    }
}
