//! Integration tests: full engine runs over small parsed graphs.
//!
//! Scripted handlers stand in for real work; no LLM or subprocess involved.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use heddle::graph::parse::parse_graph;
use heddle::handlers::register_builtin_handlers;
use heddle::{
    Checkpoint, Context, Engine, EventBus, Graph, Handler, HandlerError, HandlerRegistry, Node,
    Outcome, PipelineEvent, Status,
};

/// Handler that replays a scripted per-node sequence of outcomes.
struct Scripted {
    by_node: Mutex<std::collections::HashMap<String, VecDeque<Outcome>>>,
    fallback: Outcome,
}

impl Scripted {
    fn all_success() -> Arc<Self> {
        Arc::new(Self {
            by_node: Mutex::new(std::collections::HashMap::new()),
            fallback: Outcome::success(),
        })
    }

    fn with_script(node: &str, outcomes: impl IntoIterator<Item = Outcome>) -> Arc<Self> {
        let mut map = std::collections::HashMap::new();
        map.insert(node.to_string(), outcomes.into_iter().collect());
        Arc::new(Self {
            by_node: Mutex::new(map),
            fallback: Outcome::success(),
        })
    }
}

#[async_trait]
impl Handler for Scripted {
    async fn execute(
        &self,
        node: &Node,
        _ctx: &Context,
        _graph: &Graph,
        _stage_dir: &Path,
    ) -> Result<Outcome, HandlerError> {
        let mut guard = self.by_node.lock().unwrap();
        if let Some(queue) = guard.get_mut(&node.id) {
            if let Some(outcome) = queue.pop_front() {
                return Ok(outcome);
            }
        }
        Ok(self.fallback.clone())
    }
}

fn registry(default: Arc<dyn Handler>) -> HandlerRegistry {
    let mut reg = HandlerRegistry::new();
    register_builtin_handlers(&mut reg, None);
    reg.set_default(default);
    reg
}

fn recording_bus() -> (Arc<EventBus>, Arc<Mutex<Vec<String>>>) {
    let bus = Arc::new(EventBus::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    bus.on_all(move |e: &PipelineEvent| {
        let tag = match e {
            PipelineEvent::PipelineStarted { .. } => "pipeline_started".to_string(),
            PipelineEvent::StageStarted { node_id } => format!("stage_started:{}", node_id),
            PipelineEvent::StageRetrying { node_id, attempt, .. } => {
                format!("stage_retrying:{}:{}", node_id, attempt)
            }
            PipelineEvent::StageCompleted { node_id, .. } => {
                format!("stage_completed:{}", node_id)
            }
            PipelineEvent::CheckpointSaved { node_id, .. } => {
                format!("checkpoint_saved:{}", node_id)
            }
            PipelineEvent::PipelineCompleted { .. } => "pipeline_completed".to_string(),
            PipelineEvent::PipelineFailed { .. } => "pipeline_failed".to_string(),
        };
        sink.lock().unwrap().push(tag);
    });
    (bus, log)
}

const LINEAR: &str = r#"
    digraph linear {
        goal="run two stages";
        start [shape=Mdiamond];
        a [shape=box];
        b [shape=box];
        done [shape=Msquare];
        start -> a -> b -> done;
    }
"#;

/// Scenario: linear pipeline, all handlers succeed.
#[tokio::test]
async fn linear_pipeline_completes_with_success() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (bus, log) = recording_bus();
    let mut engine = Engine::new(
        parse_graph(LINEAR).expect("parse"),
        registry(Scripted::all_success()),
    )
    .with_logs_root(dir.path().join("run"))
    .with_event_bus(bus);

    let outcome = engine.run().await.expect("run");
    assert_eq!(outcome.status, Status::Success);
    assert_eq!(engine.completed_nodes(), &["start", "a", "b"]);

    assert!(dir.path().join("run/manifest.json").exists());
    assert!(dir.path().join("run/checkpoint.json").exists());
    assert!(dir.path().join("run/a/status.json").exists());

    let events = log.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("pipeline_started"));
    assert_eq!(events.last().map(String::as_str), Some("pipeline_completed"));
    // Per-stage ordering: started -> completed -> checkpoint, per node.
    for node in ["start", "a", "b"] {
        let started = events
            .iter()
            .position(|e| e == &format!("stage_started:{}", node))
            .expect("started");
        let completed = events
            .iter()
            .position(|e| e == &format!("stage_completed:{}", node))
            .expect("completed");
        let saved = events
            .iter()
            .position(|e| e == &format!("checkpoint_saved:{}", node))
            .expect("saved");
        assert!(started < completed && completed < saved);
    }
}

/// Scenario: conditional branching routes a FAIL to the error terminal.
#[tokio::test]
async fn conditional_branching_on_fail() {
    let src = r#"
        digraph branch {
            start [shape=Mdiamond];
            check [shape=box];
            ok [shape=Msquare];
            err [shape=Msquare];
            start -> check;
            check -> ok [condition="outcome=success"];
            check -> err [condition="outcome=fail"];
        }
    "#;
    let dir = tempfile::tempdir().expect("tempdir");
    let handler = Scripted::with_script("check", [Outcome::fail("nope")]);
    let mut engine = Engine::new(parse_graph(src).expect("parse"), registry(handler))
        .with_logs_root(dir.path().join("run"));

    let outcome = engine.run().await.expect("run");
    // Terminal reached through the fail edge; the exit accepts the run.
    assert_eq!(outcome.status, Status::Fail);
    assert!(engine.completed_nodes().contains(&"check".to_string()));
    assert!(!engine.completed_nodes().contains(&"ok".to_string()));
}

/// Scenario: retry exhaustion on an allow_partial node yields
/// PARTIAL_SUCCESS and two StageRetrying events.
#[tokio::test]
async fn retry_exhaustion_with_partial_accepted() {
    let src = r#"
        digraph retrying {
            retry_initial_delay_ms=1;
            retry_jitter=false;
            start [shape=Mdiamond];
            a [shape=box, max_retries=2, allow_partial=true];
            done [shape=Msquare];
            start -> a -> done;
        }
    "#;
    let dir = tempfile::tempdir().expect("tempdir");
    let handler = Scripted::with_script(
        "a",
        [Outcome::retry(), Outcome::retry(), Outcome::retry()],
    );
    let (bus, log) = recording_bus();
    let mut engine = Engine::new(parse_graph(src).expect("parse"), registry(handler))
        .with_logs_root(dir.path().join("run"))
        .with_event_bus(bus);

    let outcome = engine.run().await.expect("run");
    assert_eq!(outcome.status, Status::PartialSuccess);
    assert!(outcome.notes.contains("retries exhausted"));

    let events = log.lock().unwrap().clone();
    let retrying: Vec<&String> = events
        .iter()
        .filter(|e| e.starts_with("stage_retrying:a"))
        .collect();
    assert_eq!(retrying.len(), 2, "events: {:?}", events);
}

/// Scenario: goal gate fails once, engine routes back through the retry
/// target, and the second pass succeeds.
#[tokio::test]
async fn goal_gate_reroutes_to_retry_target() {
    let src = r#"
        digraph gated {
            start [shape=Mdiamond];
            a [shape=box, goal_gate=true, retry_target=a];
            done [shape=Msquare];
            start -> a -> done;
        }
    "#;
    let dir = tempfile::tempdir().expect("tempdir");
    let handler = Scripted::with_script("a", [Outcome::fail("first try"), Outcome::success()]);
    let mut engine = Engine::new(parse_graph(src).expect("parse"), registry(handler))
        .with_logs_root(dir.path().join("run"));

    let outcome = engine.run().await.expect("run");
    assert_eq!(outcome.status, Status::Success);
    // Node `a` ran twice: once failing, once after the gate reroute.
    let runs = engine
        .completed_nodes()
        .iter()
        .filter(|id| id.as_str() == "a")
        .count();
    assert_eq!(runs, 2);
}

/// Goal gate with no retry target fails the pipeline.
#[tokio::test]
async fn goal_gate_without_target_fails() {
    let src = r#"
        digraph gated {
            start [shape=Mdiamond];
            a [shape=box, goal_gate=true];
            done [shape=Msquare];
            start -> a -> done;
        }
    "#;
    let dir = tempfile::tempdir().expect("tempdir");
    let handler = Scripted::with_script("a", [Outcome::fail("no")]);
    let (bus, log) = recording_bus();
    let mut engine = Engine::new(parse_graph(src).expect("parse"), registry(handler))
        .with_logs_root(dir.path().join("run"))
        .with_event_bus(bus);

    let outcome = engine.run().await.expect("run");
    assert_eq!(outcome.status, Status::Fail);
    assert_eq!(outcome.failure_reason, "Goal gate unsatisfied");
    assert!(log.lock().unwrap().iter().any(|e| e == "pipeline_failed"));
}

/// Checkpoint restore: a fresh engine resumes after the last completed node
/// and does not rerun it.
#[tokio::test]
async fn checkpoint_restore_resumes_after_last_completed() {
    let dir = tempfile::tempdir().expect("tempdir");

    // First run completes normally and leaves a checkpoint behind.
    let mut first = Engine::new(
        parse_graph(LINEAR).expect("parse"),
        registry(Scripted::all_success()),
    )
    .with_logs_root(dir.path().join("run1"));
    first.run().await.expect("first run");

    let cp = Checkpoint::load(&dir.path().join("run1/checkpoint.json")).expect("load");
    assert_eq!(cp.current_node, "b");
    assert_eq!(cp.completed_nodes, vec!["start", "a", "b"]);

    // Pretend we stopped after `a`: resume should start at `b`.
    let truncated = Checkpoint::create_now(
        "a",
        vec!["start".to_string(), "a".to_string()],
        cp.node_retries.clone(),
        cp.context_values.clone(),
    );
    let mut resumed = Engine::new(
        parse_graph(LINEAR).expect("parse"),
        registry(Scripted::all_success()),
    )
    .with_logs_root(dir.path().join("run2"))
    .with_checkpoint(truncated);

    let outcome = resumed.run().await.expect("resumed run");
    assert_eq!(outcome.status, Status::Success);
    // Superset of the original completed list; `b` ran exactly once more.
    assert_eq!(resumed.completed_nodes(), &["start", "a", "b"]);
}

/// Preferred-label routing steers a branch without conditions.
#[tokio::test]
async fn preferred_label_routes_branch() {
    let src = r#"
        digraph labeled {
            start [shape=Mdiamond];
            review [shape=box];
            rework [shape=box];
            ship [shape=Msquare];
            start -> review;
            review -> ship [label="[A] Approve"];
            review -> rework [label="[R] Rework"];
            rework -> ship;
        }
    "#;
    let dir = tempfile::tempdir().expect("tempdir");
    let handler = Scripted::with_script(
        "review",
        [Outcome::success().with_preferred_label("approve")],
    );
    let mut engine = Engine::new(parse_graph(src).expect("parse"), registry(handler))
        .with_logs_root(dir.path().join("run"));

    let outcome = engine.run().await.expect("run");
    assert_eq!(outcome.status, Status::Success);
    // The approve label went straight to the exit; without label matching the
    // lexical tiebreak would have routed through `rework` first.
    assert!(!engine.completed_nodes().contains(&"rework".to_string()));
}
