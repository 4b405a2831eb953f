//! The session: one LLM conversation with tool dispatch.
//!
//! `process_input` drives the loop: send the conversation, execute any tool
//! calls the model emits, feed results back, repeat until the model answers
//! with text alone or a limit trips. Steering and follow-up messages queue
//! through shared handles and are drained at round boundaries; abort is a
//! flag checked there too, never mid-call.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use llm::{LlmClient, LlmError, Message, Request, ToolSpec};

use crate::config::{SessionConfig, SessionState};
use crate::environment::ExecutionEnvironment;
use crate::events::{AgentEvent, EventEmitter};
use crate::loop_detection::{detect_loop, make_signature, ToolCallSignature};
use crate::profile::ProviderProfile;
use crate::prompts;
use crate::subagents::{make_subagent_tools, SubagentShared};
use crate::tools::ToolRegistry;
use crate::truncation::truncate_tool_output;
use crate::turns::{AssistantTurn, SteeringSource, ToolCall, ToolResult, Turn};

/// Session-level failure surfaced to the caller.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Clonable handle for out-of-band control of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    steering: Arc<Mutex<VecDeque<String>>>,
    followups: Arc<Mutex<VecDeque<String>>>,
    abort: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Queues a steering message for the next round boundary.
    pub fn steer(&self, message: impl Into<String>) {
        self.steering.lock().push_back(message.into());
    }

    /// Queues an input processed after the current one completes.
    pub fn follow_up(&self, message: impl Into<String>) {
        self.followups.lock().push_back(message.into());
    }

    /// Requests a stop at the next round boundary.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }
}

/// Central orchestrator for the coding agent loop.
///
/// State-bearing and single-threaded: one `process_input` at a time.
pub struct Session {
    pub id: String,
    state: SessionState,
    history: Vec<Turn>,
    config: SessionConfig,
    depth: u32,

    llm_client: Arc<dyn LlmClient>,
    profile: Arc<ProviderProfile>,
    env: Arc<dyn ExecutionEnvironment>,
    emitter: Arc<EventEmitter>,

    /// Effective tool belt: profile tools plus subagent tools when allowed.
    tools: ToolRegistry,
    subagents: SubagentShared,

    steering: Arc<Mutex<VecDeque<String>>>,
    followups: Arc<Mutex<VecDeque<String>>>,
    abort: Arc<AtomicBool>,
    signatures: Vec<ToolCallSignature>,
}

impl Session {
    pub fn new(
        llm_client: Arc<dyn LlmClient>,
        profile: Arc<ProviderProfile>,
        env: Arc<dyn ExecutionEnvironment>,
    ) -> Self {
        Self::with_config(llm_client, profile, env, SessionConfig::default(), 0)
    }

    /// Full constructor; `depth` is the subagent nesting level.
    pub fn with_config(
        llm_client: Arc<dyn LlmClient>,
        profile: Arc<ProviderProfile>,
        env: Arc<dyn ExecutionEnvironment>,
        config: SessionConfig,
        depth: u32,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let subagents = SubagentShared::default();

        let mut tools = profile.tool_registry.clone();
        for tool in make_subagent_tools(
            llm_client.clone(),
            profile.clone(),
            env.clone(),
            &config,
            depth,
            subagents.clone(),
        ) {
            tools.register(tool);
        }

        let emitter = Arc::new(EventEmitter::new());
        emitter.emit(&AgentEvent::SessionStart {
            session_id: id.clone(),
        });

        Self {
            id,
            state: SessionState::Idle,
            history: Vec::new(),
            config,
            depth,
            llm_client,
            profile,
            env,
            emitter,
            tools,
            subagents,
            steering: Arc::new(Mutex::new(VecDeque::new())),
            followups: Arc::new(Mutex::new(VecDeque::new())),
            abort: Arc::new(AtomicBool::new(false)),
            signatures: Vec::new(),
        }
    }

    /// Uses a shared emitter so the host observes session events (builder).
    pub fn with_emitter(mut self, emitter: Arc<EventEmitter>) -> Self {
        emitter.emit(&AgentEvent::SessionStart {
            session_id: self.id.clone(),
        });
        self.emitter = emitter;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn emitter(&self) -> Arc<EventEmitter> {
        self.emitter.clone()
    }

    /// Names of the tools this session exposes to the model.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect()
    }

    /// Handle for steering/follow-up/abort from outside the processing loop.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            steering: self.steering.clone(),
            followups: self.followups.clone(),
            abort: self.abort.clone(),
        }
    }

    /// Queues a steering message (injected at the next round boundary).
    pub fn steer(&self, message: impl Into<String>) {
        self.steering.lock().push_back(message.into());
    }

    /// Queues an input to process after the current one completes.
    pub fn follow_up(&self, message: impl Into<String>) {
        self.followups.lock().push_back(message.into());
    }

    /// Requests a stop at the next round boundary.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Closes the session; further input fails.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        self.emitter.emit(&AgentEvent::SessionEnd {
            session_id: self.id.clone(),
            reason: "closed".to_string(),
        });
    }

    /// Runs the agent loop for one user input (plus queued follow-ups) and
    /// returns the final assistant turn.
    pub async fn process_input(
        &mut self,
        user_input: impl Into<String>,
    ) -> Result<AssistantTurn, SessionError> {
        let mut input = user_input.into();

        loop {
            if self.state == SessionState::Closed {
                return Err(SessionError::Closed);
            }
            self.state = SessionState::Processing;

            self.history.push(Turn::user(input.clone()));
            self.emitter.emit(&AgentEvent::UserInput {
                content: input.clone(),
            });
            self.drain_steering();

            let last = self.run_rounds().await?;

            let next = self.followups.lock().pop_front();
            match next {
                Some(message) => {
                    input = message;
                }
                None => {
                    self.state = SessionState::Idle;
                    return Ok(last);
                }
            }
        }
    }

    /// The inner round loop for one input.
    async fn run_rounds(&mut self) -> Result<AssistantTurn, SessionError> {
        let mut round_count: u32 = 0;
        let mut last = AssistantTurn::default();

        loop {
            if round_count >= self.config.max_tool_rounds_per_input {
                self.emitter.emit(&AgentEvent::TurnLimit {
                    turns_used: round_count,
                    max_turns: self.config.max_tool_rounds_per_input,
                });
                break;
            }
            if self.config.max_turns > 0 && self.count_turns() >= self.config.max_turns {
                self.emitter.emit(&AgentEvent::TurnLimit {
                    turns_used: self.count_turns(),
                    max_turns: self.config.max_turns,
                });
                break;
            }
            if self.abort.load(Ordering::SeqCst) {
                tracing::debug!(session = %self.id, "abort observed at round boundary");
                break;
            }

            let request = self.build_request().await;
            let response = match self.llm_client.complete(request).await {
                Ok(r) => r,
                Err(e) => {
                    self.emitter.emit(&AgentEvent::Error {
                        error: e.to_string(),
                        recoverable: false,
                    });
                    self.state = SessionState::Closed;
                    self.emitter.emit(&AgentEvent::SessionEnd {
                        session_id: self.id.clone(),
                        reason: "error".to_string(),
                    });
                    return Err(e.into());
                }
            };

            let tool_calls: Vec<ToolCall> = response
                .tool_calls
                .iter()
                .map(|tc| ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                })
                .collect();

            self.history.push(Turn::Assistant {
                content: response.text.clone(),
                tool_calls: tool_calls.clone(),
                usage: Some(response.usage),
            });
            last = AssistantTurn {
                content: response.text.clone(),
                tool_calls: tool_calls.clone(),
                usage: Some(response.usage),
            };
            self.emitter.emit(&AgentEvent::AssistantTextEnd {
                full_text: response.text.clone(),
            });

            if tool_calls.is_empty() {
                break;
            }

            round_count += 1;
            let results = self.execute_tool_calls(&tool_calls).await;
            self.history.push(Turn::ToolResults { results });
            self.drain_steering();

            if self.config.enable_loop_detection {
                if let Some(message) =
                    detect_loop(&self.signatures, self.config.loop_detection_window)
                {
                    self.history
                        .push(Turn::steering(message.clone(), SteeringSource::LoopDetection));
                    self.emitter.emit(&AgentEvent::LoopDetection { message });
                }
            }
        }

        Ok(last)
    }

    async fn build_request(&self) -> Request {
        let definitions = self.tools.definitions();
        let system_prompt = prompts::build_system_prompt(
            &self.profile.base_instructions,
            self.env.as_ref(),
            &definitions,
            &self.profile.model,
            &self.profile.id,
            self.profile.user_instructions.as_deref(),
        )
        .await;

        let mut messages = vec![Message::system(system_prompt)];
        messages.extend(self.history_to_messages());

        Request {
            messages,
            model: self.profile.model.clone(),
            tools: definitions
                .into_iter()
                .map(|d| ToolSpec {
                    name: d.name,
                    description: d.description,
                    parameters: d.parameters,
                })
                .collect(),
            reasoning_effort: self.config.reasoning_effort.clone(),
            provider: self.profile.provider.clone(),
            ..Default::default()
        }
    }

    /// Executes one round of tool calls sequentially.
    async fn execute_tool_calls(&mut self, tool_calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            results.push(self.execute_single_tool(call).await);
        }
        results
    }

    async fn execute_single_tool(&mut self, call: &ToolCall) -> ToolResult {
        self.emitter.emit(&AgentEvent::ToolCallStart {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
        });
        self.signatures
            .push(make_signature(&call.name, &call.arguments));

        let Some(registered) = self.tools.get(&call.name) else {
            let message = format!("Unknown tool: {}", call.name);
            self.emitter.emit(&AgentEvent::ToolCallEnd {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                output: message.clone(),
                is_error: true,
            });
            return ToolResult::error(call.id.clone(), message);
        };
        let executor = registered.executor.clone();

        tracing::debug!(session = %self.id, tool = %call.name, "tool call");
        match executor.execute(&call.arguments, self.env.as_ref()).await {
            Ok(raw_output) => {
                let truncated = truncate_tool_output(&raw_output, &call.name);
                // The event carries the raw output; history gets the
                // truncated form.
                self.emitter.emit(&AgentEvent::ToolCallEnd {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    output: raw_output,
                    is_error: false,
                });
                ToolResult::ok(call.id.clone(), truncated)
            }
            Err(e) => {
                let message = format!("Tool error ({}): {}", call.name, e);
                self.emitter.emit(&AgentEvent::ToolCallEnd {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    output: message.clone(),
                    is_error: true,
                });
                ToolResult::error(call.id.clone(), message)
            }
        }
    }

    fn drain_steering(&mut self) {
        loop {
            let message = self.steering.lock().pop_front();
            let Some(message) = message else { break };
            self.history
                .push(Turn::steering(message.clone(), SteeringSource::Host));
            self.emitter
                .emit(&AgentEvent::SteeringInjected { content: message });
        }
    }

    /// Converts history to provider-neutral messages. System turns are
    /// skipped; the system prompt is rebuilt per request.
    fn history_to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::new();
        for turn in &self.history {
            match turn {
                Turn::User { content } => messages.push(Message::user(content.clone())),
                Turn::Assistant {
                    content,
                    tool_calls,
                    ..
                } => {
                    let calls: Vec<llm::ToolCallData> = tool_calls
                        .iter()
                        .map(|tc| llm::ToolCallData {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        })
                        .collect();
                    messages.push(Message::assistant_with_tool_calls(content.clone(), calls));
                }
                Turn::ToolResults { results } => {
                    for result in results {
                        messages
                            .push(Message::tool(result.tool_call_id.clone(), result.output.clone()));
                    }
                }
                Turn::Steering { content, .. } => messages.push(Message::user(content.clone())),
                Turn::System { .. } => {}
            }
        }
        messages
    }

    fn count_turns(&self) -> u32 {
        self.history
            .iter()
            .filter(|t| t.counts_toward_turn_limit())
            .count() as u32
    }

    /// Subagent handles held by this session (id → status snapshot).
    pub async fn subagent_statuses(&self) -> HashMap<String, String> {
        self.subagents.statuses().await
    }
}
