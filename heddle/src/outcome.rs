//! Handler outcome types.
//!
//! Every node handler returns an [`Outcome`]; the engine records it, applies
//! its context updates, and feeds it to the edge selector.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal status of one handler execution.
///
/// `Retry` asks the engine to re-run the node under its retry policy;
/// the other variants are final for that attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    PartialSuccess,
    Fail,
    Retry,
    Skipped,
}

impl Status {
    /// Lowercase name used by condition expressions and status files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::PartialSuccess => "partial_success",
            Status::Fail => "fail",
            Status::Retry => "retry",
            Status::Skipped => "skipped",
        }
    }

    /// Whether this status satisfies a goal gate (success or partial success).
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Success | Status::PartialSuccess)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one node execution.
///
/// `preferred_label` and `suggested_next_ids` are routing hints consumed by
/// the edge selector; `context_updates` is merged into the run context by the
/// engine (handlers never mutate the context directly).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub status: Status,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preferred_label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_next_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context_updates: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl Outcome {
    /// Creates an outcome with the given status and empty hint fields.
    pub fn new(status: Status) -> Self {
        Self {
            status,
            preferred_label: String::new(),
            suggested_next_ids: Vec::new(),
            context_updates: HashMap::new(),
            failure_reason: String::new(),
            notes: String::new(),
        }
    }

    /// Successful outcome with no hints.
    pub fn success() -> Self {
        Self::new(Status::Success)
    }

    /// Failed outcome with a reason.
    pub fn fail(reason: impl Into<String>) -> Self {
        let mut o = Self::new(Status::Fail);
        o.failure_reason = reason.into();
        o
    }

    /// Retry request (re-run under the node's retry policy).
    pub fn retry() -> Self {
        Self::new(Status::Retry)
    }

    /// Sets the preferred label hint (builder).
    pub fn with_preferred_label(mut self, label: impl Into<String>) -> Self {
        self.preferred_label = label.into();
        self
    }

    /// Sets the suggested next node ids (builder).
    pub fn with_suggested_next_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggested_next_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Adds one context update (builder).
    pub fn with_context_update(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context_updates.insert(key.into(), value.into());
        self
    }

    /// Sets the free-form notes (builder).
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

impl Default for Outcome {
    fn default() -> Self {
        Self::success()
    }
}
