//! OpenAI-compatible adapter.
//!
//! Works with any endpoint following the OpenAI chat-completions contract
//! (OpenAI, Azure-style gateways, Ollama, vLLM, LM Studio, Together).
//! Translates the provider-neutral [`Request`]/[`Response`] to the wire
//! JSON, maps HTTP failures through the error taxonomy, and assembles SSE
//! streams into [`StreamEvent`]s.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use crate::client::{EventStream, LlmClient};
use crate::error::LlmError;
use crate::types::{
    FinishReason, Message, Request, Response, Role, StreamEvent, ToolCallData, Usage,
};

/// Adapter for OpenAI-compatible chat-completions endpoints.
pub struct OpenAiCompatClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
    provider_name: String,
}

impl OpenAiCompatClient {
    /// Creates an adapter for `base_url` (without the `/chat/completions`
    /// suffix) authenticated with a bearer key.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http,
            provider_name: "openai_compat".to_string(),
        })
    }

    /// Overrides the provider name reported on responses (builder).
    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = name.into();
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body(&self, request: &Request, stream: bool) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(message_to_wire).collect();
        let mut body = json!({
            "model": request.model,
            "messages": messages,
        });
        if stream {
            body["stream"] = json!(true);
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect(),
            );
        }
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(p) = request.top_p {
            body["top_p"] = json!(p);
        }
        if let Some(m) = request.max_tokens {
            body["max_tokens"] = json!(m);
        }
        if !request.stop_sequences.is_empty() {
            body["stop"] = json!(request.stop_sequences);
        }
        if let Some(effort) = &request.reasoning_effort {
            body["reasoning_effort"] = json!(effort);
        }
        for (key, value) in &request.provider_options {
            body[key] = value.clone();
        }
        body
    }

    async fn post(&self, body: Value) -> Result<reqwest::Response, LlmError> {
        let resp = self
            .http
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok());
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::from_status_with_retry_after(
                status.as_u16(),
                text,
                retry_after,
            ));
        }
        Ok(resp)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout(err.to_string())
    } else if err.is_connect() {
        LlmError::Network(err.to_string())
    } else {
        LlmError::Network(err.to_string())
    }
}

fn message_to_wire(message: &Message) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let mut wire = json!({ "role": role, "content": message.content });
    if !message.tool_calls.is_empty() {
        wire["tool_calls"] = Value::Array(
            message
                .tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect(),
        );
    }
    if let Some(id) = &message.tool_call_id {
        wire["tool_call_id"] = json!(id);
    }
    wire
}

fn parse_finish_reason(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

fn parse_usage(raw: &Value) -> Usage {
    let u = &raw["usage"];
    Usage {
        input_tokens: u["prompt_tokens"].as_u64().unwrap_or(0),
        output_tokens: u["completion_tokens"].as_u64().unwrap_or(0),
        reasoning_tokens: u["completion_tokens_details"]["reasoning_tokens"]
            .as_u64()
            .unwrap_or(0),
        cached_tokens: u["prompt_tokens_details"]["cached_tokens"]
            .as_u64()
            .unwrap_or(0),
    }
}

fn parse_tool_calls(raw: &Value) -> Vec<ToolCallData> {
    let Some(calls) = raw.as_array() else {
        return Vec::new();
    };
    calls
        .iter()
        .map(|tc| {
            let args_text = tc["function"]["arguments"].as_str().unwrap_or("{}");
            ToolCallData {
                id: tc["id"].as_str().unwrap_or("").to_string(),
                name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                arguments: serde_json::from_str(args_text).unwrap_or(Value::Null),
            }
        })
        .collect()
}

fn parse_response(raw: Value, provider: &str) -> Result<Response, LlmError> {
    let choice = raw["choices"]
        .get(0)
        .ok_or_else(|| LlmError::InvalidRequest("response has no choices".to_string()))?;
    let message = &choice["message"];
    Ok(Response {
        text: message["content"].as_str().unwrap_or("").to_string(),
        tool_calls: parse_tool_calls(&message["tool_calls"]),
        usage: parse_usage(&raw),
        finish_reason: parse_finish_reason(choice["finish_reason"].as_str()),
        provider: provider.to_string(),
        raw: Some(raw),
    })
}

/// Partially assembled tool call while streaming deltas arrive.
#[derive(Default, Clone)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

struct SseAssembler {
    text: String,
    tool_calls: Vec<PartialToolCall>,
    finish_reason: FinishReason,
    usage: Usage,
    provider: String,
}

impl SseAssembler {
    fn new(provider: String) -> Self {
        Self {
            text: String::new(),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Other,
            usage: Usage::default(),
            provider,
        }
    }

    /// Folds one `data:` chunk in; returns deltas to emit.
    fn ingest(&mut self, chunk: &Value) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if chunk.get("usage").is_some() && !chunk["usage"].is_null() {
            self.usage = parse_usage(chunk);
        }
        let Some(choice) = chunk["choices"].get(0) else {
            return out;
        };
        if let Some(reason) = choice["finish_reason"].as_str() {
            self.finish_reason = parse_finish_reason(Some(reason));
        }
        let delta = &choice["delta"];
        if let Some(content) = delta["content"].as_str() {
            if !content.is_empty() {
                self.text.push_str(content);
                out.push(StreamEvent::TextDelta(content.to_string()));
            }
        }
        if let Some(calls) = delta["tool_calls"].as_array() {
            for tc in calls {
                let index = tc["index"].as_u64().unwrap_or(0) as usize;
                if self.tool_calls.len() <= index {
                    self.tool_calls.resize(index + 1, PartialToolCall::default());
                }
                let partial = &mut self.tool_calls[index];
                if let Some(id) = tc["id"].as_str() {
                    partial.id = id.to_string();
                }
                if let Some(name) = tc["function"]["name"].as_str() {
                    partial.name.push_str(name);
                }
                if let Some(args) = tc["function"]["arguments"].as_str() {
                    partial.arguments.push_str(args);
                }
            }
        }
        out
    }

    fn finish(self) -> Response {
        let tool_calls = self
            .tool_calls
            .into_iter()
            .filter(|p| !p.name.is_empty())
            .map(|p| ToolCallData {
                id: p.id,
                name: p.name,
                arguments: serde_json::from_str(&p.arguments).unwrap_or(Value::Null),
            })
            .collect();
        Response {
            text: self.text,
            tool_calls,
            usage: self.usage,
            finish_reason: self.finish_reason,
            provider: self.provider,
            raw: None,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, request: Request) -> Result<Response, LlmError> {
        let body = self.build_body(&request, false);
        tracing::debug!(model = %request.model, url = %self.chat_url(), "llm complete");
        let resp = self.post(body).await?;
        let raw: Value = resp.json().await.map_err(map_reqwest_error)?;
        parse_response(raw, &self.provider_name)
    }

    async fn stream(&self, request: Request) -> Result<EventStream, LlmError> {
        let body = self.build_body(&request, true);
        tracing::debug!(model = %request.model, url = %self.chat_url(), "llm stream");
        let resp = self.post(body).await?;

        struct State {
            body: futures::stream::BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>,
            buffer: String,
            pending: VecDeque<StreamEvent>,
            assembler: Option<SseAssembler>,
        }

        let state = State {
            body: resp.bytes_stream().boxed(),
            buffer: String::new(),
            pending: VecDeque::new(),
            assembler: Some(SseAssembler::new(self.provider_name.clone())),
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((Ok(event), state));
                }
                if state.assembler.is_none() {
                    return None;
                }

                // Drain complete SSE lines from the buffer first.
                if let Some(newline) = state.buffer.find('\n') {
                    let line: String = state.buffer.drain(..=newline).collect();
                    let line = line.trim();
                    if let Some(data) = line.strip_prefix("data:") {
                        let data = data.trim();
                        if data == "[DONE]" {
                            if let Some(assembler) = state.assembler.take() {
                                state
                                    .pending
                                    .push_back(StreamEvent::Finish(assembler.finish()));
                            }
                        } else if let Ok(chunk) = serde_json::from_str::<Value>(data) {
                            if let Some(assembler) = state.assembler.as_mut() {
                                for event in assembler.ingest(&chunk) {
                                    state.pending.push_back(event);
                                }
                            }
                        }
                    }
                    continue;
                }

                match state.body.next().await {
                    Some(Ok(bytes)) => {
                        state.buffer.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Err(e)) => {
                        state.assembler = None;
                        return Some((Err(map_reqwest_error(e)), state));
                    }
                    None => {
                        // Stream closed without [DONE]: finish with what we have.
                        match state.assembler.take() {
                            Some(assembler) => {
                                return Some((
                                    Ok(StreamEvent::Finish(assembler.finish())),
                                    state,
                                ));
                            }
                            None => return None,
                        }
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
