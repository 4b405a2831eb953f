//! # agent-loop
//!
//! The LLM-driven inner loop behind codergen pipeline nodes: a [`Session`]
//! sends the conversation to an [`LlmClient`](llm::LlmClient), executes the
//! tool calls the model emits, feeds truncated results back, and iterates
//! until the model answers with text alone or a limit trips.
//!
//! ## Main modules
//!
//! - [`session`]: [`Session`], the conversation state machine with steering
//!   and follow-up queues and abort at round boundaries.
//! - [`turns`]: [`Turn`], [`ToolCall`], [`ToolResult`], the history model.
//! - [`tools`]: registry plus the core belt (read/write/edit/shell/grep/
//!   glob) and the structured patch applier.
//! - [`environment`]: [`ExecutionEnvironment`] and the local implementation
//!   with env-var policies and process-group timeouts.
//! - [`truncation`]: two-stage char+line output shaping.
//! - [`loop_detection`]: tool-call signature window analysis.
//! - [`prompts`] / [`profile`]: layered system prompt assembly and provider
//!   profiles.
//! - [`subagents`]: bounded-depth child sessions exposed as tools.
//! - [`codergen`]: [`CodergenHandler`], the bridge into the pipeline
//!   engine.

pub mod codergen;
pub mod config;
pub mod environment;
pub mod events;
pub mod loop_detection;
pub mod profile;
pub mod prompts;
pub mod session;
pub mod subagents;
pub mod tool_node;
pub mod tools;
pub mod truncation;
pub mod turns;

pub use codergen::CodergenHandler;
pub use config::{SessionConfig, SessionState};
pub use environment::{
    DirEntry, EnvError, EnvVarPolicy, ExecResult, ExecutionEnvironment, GrepOptions,
    LocalExecutionEnvironment,
};
pub use events::{AgentEvent, EventEmitter};
pub use loop_detection::{detect_loop, make_signature, ToolCallSignature};
pub use profile::ProviderProfile;
pub use session::{Session, SessionError, SessionHandle};
pub use subagents::{SubAgentHandle, SubAgentResult, SubAgentStatus};
pub use tool_node::ToolHandler;
pub use tools::{RegisteredTool, ToolDefinition, ToolError, ToolExecutor, ToolRegistry};
pub use truncation::{truncate_tool_output, TruncationConfig, TruncationMode};
pub use turns::{AssistantTurn, SteeringSource, ToolCall, ToolResult, Turn};
