//! Integration tests: full session rounds with a mock LLM and real tools.

use std::sync::{Arc, Mutex};

use agent_loop::{
    AgentEvent, EventEmitter, ExecutionEnvironment, LocalExecutionEnvironment, ProviderProfile,
    Session, SessionConfig, Turn,
};
use llm::{FinishReason, LlmClient, MockClient, Response, ToolCallData, Usage};
use serde_json::json;

fn fixtures(
    mock: MockClient,
) -> (
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
        Arc::new(mock),
        Arc::new(ProviderProfile::new("anthropic", "test-model", "be helpful")),
        env,
        dir,
    )
}

fn recording_emitter() -> (Arc<EventEmitter>, Arc<Mutex<Vec<AgentEvent>>>) {
    let emitter = Arc::new(EventEmitter::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    emitter.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
    (emitter, log)
}

fn tool_call_response(command: &str, call_id: &str) -> Response {
    Response {
        text: String::new(),
        tool_calls: vec![ToolCallData {
            id: call_id.to_string(),
            name: "shell".to_string(),
            arguments: json!({ "command": command }),
        }],
        usage: Usage::default(),
        finish_reason: FinishReason::ToolCalls,
        provider: "mock".to_string(),
        raw: None,
    }
}

/// Scenario: one shell tool round, then a text-only completion.
#[tokio::test]
async fn shell_round_then_text_completion() {
    let mock = MockClient::first_tool_call_then_text(
        "shell",
        json!({"command": "echo hi"}),
        "done",
    );
    let (llm_client, profile, env, _dir) = fixtures(mock);
    let (emitter, log) = recording_emitter();
    let mut session = Session::new(llm_client, profile, env).with_emitter(emitter);

    let turn = session.process_input("run echo").await.expect("process");
    assert_eq!(turn.content, "done");

    // History shape: User -> Assistant(tool_calls=1) -> ToolResults(1) -> Assistant(text).
    let history = session.history();
    assert!(matches!(&history[0], Turn::User { content } if content == "run echo"));
    match &history[1] {
        Turn::Assistant { tool_calls, .. } => assert_eq!(tool_calls.len(), 1),
        other => panic!("expected assistant turn, got {:?}", other),
    }
    match &history[2] {
        Turn::ToolResults { results } => {
            assert_eq!(results.len(), 1);
            assert!(results[0].output.contains("hi"));
            assert!(!results[0].is_error);
        }
        other => panic!("expected tool results, got {:?}", other),
    }
    assert!(matches!(&history[3], Turn::Assistant { content, .. } if content == "done"));

    // The end event carries the raw stdout.
    let events = log.lock().unwrap();
    let end = events
        .iter()
        .find_map(|e| match e {
            AgentEvent::ToolCallEnd {
                output, is_error, ..
            } => Some((output.clone(), *is_error)),
            _ => None,
        })
        .expect("tool call end event");
    assert!(end.0.contains("hi"));
    assert!(!end.1);
}

/// Every ToolCallStart has a matching ToolCallEnd with the same id.
#[tokio::test]
async fn tool_events_pair_by_id() {
    let mock = MockClient::with_responses([
        tool_call_response("echo one", "call-1"),
        tool_call_response("echo two", "call-2"),
        Response::text_only("finished"),
    ]);
    let (llm_client, profile, env, _dir) = fixtures(mock);
    let (emitter, log) = recording_emitter();
    let mut session = Session::new(llm_client, profile, env).with_emitter(emitter);
    session.process_input("go").await.expect("process");

    let events = log.lock().unwrap();
    let starts: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::ToolCallStart { tool_call_id, .. } => Some(tool_call_id.clone()),
            _ => None,
        })
        .collect();
    let ends: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::ToolCallEnd { tool_call_id, .. } => Some(tool_call_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(starts, vec!["call-1", "call-2"]);
    assert_eq!(starts, ends);
}

/// Unknown tools become error results without aborting the session.
#[tokio::test]
async fn unknown_tool_is_soft_error() {
    let unknown_call = Response {
        text: String::new(),
        tool_calls: vec![ToolCallData {
            id: "c1".to_string(),
            name: "teleport".to_string(),
            arguments: json!({}),
        }],
        usage: Usage::default(),
        finish_reason: FinishReason::ToolCalls,
        provider: "mock".to_string(),
        raw: None,
    };
    let mock = MockClient::with_responses([unknown_call, Response::text_only("recovered")]);
    let (llm_client, profile, env, _dir) = fixtures(mock);
    let mut session = Session::new(llm_client, profile, env);
    let turn = session.process_input("go").await.expect("process");
    assert_eq!(turn.content, "recovered");

    let results = session
        .history()
        .iter()
        .find_map(|t| match t {
            Turn::ToolResults { results } => Some(results.clone()),
            _ => None,
        })
        .expect("tool results");
    assert!(results[0].is_error);
    assert_eq!(results[0].output, "Unknown tool: teleport");
}

/// Scenario: twelve identical tool calls trip the loop detector, which
/// injects a steering turn and emits at least one detection event.
#[tokio::test]
async fn identical_calls_trip_loop_detection() {
    let mut responses: Vec<Response> = (0..12)
        .map(|i| tool_call_response("echo loop", &format!("call-{}", i)))
        .collect();
    responses.push(Response::text_only("giving up"));
    let (llm_client, profile, env, _dir) = fixtures(MockClient::with_responses(responses));
    let (emitter, log) = recording_emitter();
    let config = SessionConfig {
        loop_detection_window: 10,
        ..Default::default()
    };
    let mut session =
        Session::with_config(llm_client, profile, env, config, 0).with_emitter(emitter);
    session.process_input("start").await.expect("process");

    let detections = log
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, AgentEvent::LoopDetection { .. }))
        .count();
    assert!(detections >= 1, "expected at least one detection");

    let steering_turns = session
        .history()
        .iter()
        .filter(|t| matches!(t, Turn::Steering { .. }))
        .count();
    assert!(steering_turns >= 1);
}

/// Tool-round cap stops a runaway session.
#[tokio::test]
async fn round_limit_stops_looping_model() {
    let responses: Vec<Response> = (0..20)
        .map(|i| tool_call_response(&format!("echo {}", i), &format!("c{}", i)))
        .collect();
    let (llm_client, profile, env, _dir) = fixtures(MockClient::with_responses(responses));
    let (emitter, log) = recording_emitter();
    let config = SessionConfig {
        max_tool_rounds_per_input: 3,
        enable_loop_detection: false,
        ..Default::default()
    };
    let mut session =
        Session::with_config(llm_client, profile, env, config, 0).with_emitter(emitter);
    session.process_input("go").await.expect("process");

    let limit_events = log
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, AgentEvent::TurnLimit { .. }))
        .count();
    assert_eq!(limit_events, 1);

    let rounds = session
        .history()
        .iter()
        .filter(|t| matches!(t, Turn::ToolResults { .. }))
        .count();
    assert_eq!(rounds, 3);
}

/// A session at the subagent depth cap exposes no subagent tools; one below
/// it does.
#[tokio::test]
async fn depth_cap_removes_subagent_tools() {
    let (llm_client, profile, env, _dir) = fixtures(MockClient::with_text("x"));
    let config = SessionConfig {
        max_subagent_depth: 2,
        ..Default::default()
    };
    let parent = Session::with_config(
        llm_client.clone(),
        profile.clone(),
        env.clone(),
        config.clone(),
        0,
    );
    assert!(parent.tool_names().contains(&"spawn_agent".to_string()));

    let at_cap = Session::with_config(llm_client, profile, env, config, 2);
    assert!(!at_cap.tool_names().contains(&"spawn_agent".to_string()));
}
