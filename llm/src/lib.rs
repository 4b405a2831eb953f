//! Provider-neutral LLM client.
//!
//! One request/response shape ([`Request`], [`Response`]) covers every
//! provider; adapters translate to vendor wire formats. Failures are
//! normalized into the [`LlmError`] taxonomy so callers branch on
//! retryability, not vendor payloads.
//!
//! ## Main pieces
//!
//! - [`LlmClient`]: the trait sessions and handlers consume
//!   (`complete` / `stream`).
//! - [`Client`]: router over named adapters with a default provider.
//! - [`MockClient`]: scripted responses for tests and offline runs.
//! - [`OpenAiCompatClient`]: adapter for OpenAI-style chat-completions
//!   endpoints, including SSE streaming.

pub mod client;
pub mod error;
pub mod mock;
pub mod openai_compat;
pub mod types;

pub use client::{Client, EventStream, LlmClient};
pub use error::LlmError;
pub use mock::MockClient;
pub use openai_compat::OpenAiCompatClient;
pub use types::{
    FinishReason, Message, Request, Response, Role, StreamEvent, ToolCallData, ToolSpec, Usage,
};
