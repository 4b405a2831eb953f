//! Mock LLM client for tests and offline runs.
//!
//! Replays a scripted FIFO of responses; configurable for the common shapes
//! (text only, tool calls then text, scripted error).

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use crate::client::{EventStream, LlmClient};
use crate::error::LlmError;
use crate::types::{FinishReason, Request, Response, StreamEvent, ToolCallData, Usage};

enum Scripted {
    Respond(Response),
    Fail(fn() -> LlmError),
}

/// Mock client: pops one scripted response per `complete` call.
///
/// When the script runs dry the last configured fallback response repeats,
/// so "text only forever" mocks stay a one-liner.
pub struct MockClient {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Response,
    /// Requests seen, for assertions on what the session sent.
    requests: Mutex<Vec<Request>>,
}

impl MockClient {
    /// Always returns the given text.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Response::text_only(text),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replays the given responses in order, then repeats the last one.
    pub fn with_responses(responses: impl IntoIterator<Item = Response>) -> Self {
        let mut queue: VecDeque<Scripted> =
            responses.into_iter().map(Scripted::Respond).collect();
        let fallback = match queue.back() {
            Some(Scripted::Respond(r)) => r.clone(),
            _ => Response::text_only("done"),
        };
        if let Some(Scripted::Respond(_)) = queue.back() {
            queue.pop_back();
        }
        Self {
            script: Mutex::new(queue),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// First response carries one tool call, second is text-only.
    pub fn first_tool_call_then_text(
        name: impl Into<String>,
        arguments: serde_json::Value,
        text: impl Into<String>,
    ) -> Self {
        let tool_response = Response {
            text: String::new(),
            tool_calls: vec![ToolCallData {
                id: "call-1".to_string(),
                name: name.into(),
                arguments,
            }],
            usage: Usage::default(),
            finish_reason: FinishReason::ToolCalls,
            provider: "mock".to_string(),
            raw: None,
        };
        Self::with_responses([tool_response, Response::text_only(text)])
    }

    /// Fails every call with the given error constructor.
    pub fn failing(make_error: fn() -> LlmError) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Scripted::Fail(make_error)])),
            fallback: Response::text_only(""),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests observed so far.
    pub fn seen_requests(&self) -> Vec<Request> {
        self.requests.lock().expect("mock lock").clone()
    }

    fn next_response(&self) -> Result<Response, LlmError> {
        let mut script = self.script.lock().expect("mock lock");
        match script.pop_front() {
            Some(Scripted::Respond(r)) => Ok(r),
            Some(Scripted::Fail(make)) => {
                // Errors repeat; a closed backend stays closed.
                script.push_front(Scripted::Fail(make));
                Err(make())
            }
            None => Ok(self.fallback.clone()),
        }
    }
}

#[async_trait]
impl LlmClient for MockClient {
    async fn complete(&self, request: Request) -> Result<Response, LlmError> {
        self.requests.lock().expect("mock lock").push(request);
        self.next_response()
    }

    async fn stream(&self, request: Request) -> Result<EventStream, LlmError> {
        self.requests.lock().expect("mock lock").push(request);
        let response = self.next_response()?;
        let mut events = Vec::new();
        if !response.text.is_empty() {
            events.push(Ok(StreamEvent::TextDelta(response.text.clone())));
        }
        for tc in &response.tool_calls {
            events.push(Ok(StreamEvent::ToolCallDelta(tc.clone())));
        }
        events.push(Ok(StreamEvent::Finish(response)));
        Ok(Box::pin(stream::iter(events)))
    }
}
