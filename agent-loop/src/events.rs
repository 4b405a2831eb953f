//! Session events and the synchronous emitter.
//!
//! Sessions narrate their lifecycle through [`AgentEvent`]s: input, assistant
//! text, tool calls (with the raw pre-truncation output), steering, limits,
//! and errors. The emitter is a plain synchronous listener list; emission
//! order is the order things happened.

use serde_json::Value;

/// One session lifecycle event.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    SessionStart {
        session_id: String,
    },
    SessionEnd {
        session_id: String,
        reason: String,
    },
    UserInput {
        content: String,
    },
    /// Incremental assistant text, when the host streams.
    AssistantTextDelta {
        delta: String,
    },
    /// Full assistant text for one response.
    AssistantTextEnd {
        full_text: String,
    },
    ToolCallStart {
        tool_call_id: String,
        tool_name: String,
        arguments: Value,
    },
    /// Carries the raw (pre-truncation) output; history gets the truncated form.
    ToolCallEnd {
        tool_call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    SteeringInjected {
        content: String,
    },
    TurnLimit {
        turns_used: u32,
        max_turns: u32,
    },
    LoopDetection {
        message: String,
    },
    Error {
        error: String,
        recoverable: bool,
    },
}

type Listener = Box<dyn Fn(&AgentEvent) + Send + Sync>;

/// Synchronous fan-out for session events.
#[derive(Default)]
pub struct EventEmitter {
    listeners: parking_lot::RwLock<Vec<Listener>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener; all listeners see every event in order.
    pub fn subscribe(&self, listener: impl Fn(&AgentEvent) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    pub fn emit(&self, event: &AgentEvent) {
        for listener in self.listeners.read().iter() {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn listeners_see_events_in_order() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        emitter.subscribe(move |e| {
            let tag = match e {
                AgentEvent::UserInput { .. } => "input",
                AgentEvent::AssistantTextEnd { .. } => "text",
                _ => "other",
            };
            sink.lock().unwrap().push(tag);
        });
        emitter.emit(&AgentEvent::UserInput {
            content: "hi".to_string(),
        });
        emitter.emit(&AgentEvent::AssistantTextEnd {
            full_text: "yo".to_string(),
        });
        assert_eq!(*seen.lock().unwrap(), vec!["input", "text"]);
    }
}
