//! Retry policies for node execution.
//!
//! A node gets `max_retries + 1` attempts; the delay between attempts grows
//! exponentially, is capped, and may be jittered to avoid lockstep retries.

use std::time::Duration;

use rand::Rng;

use crate::graph::{Graph, Node};

/// Exponential backoff parameters.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Multiplier applied per attempt (1.0 = linear).
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
    /// Scale each delay by a uniform factor in [0.5, 1.5].
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

/// Retry policy for one node: attempt budget plus backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (retries + 1).
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn single() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffConfig::default(),
        }
    }

    /// Delay to sleep after attempt `attempt` (1-based) fails.
    ///
    /// `min(initial * multiplier^(attempt-1), max)`, optionally jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let raw = self.backoff.initial_delay_ms as f64 * self.backoff.multiplier.powi(exp);
        let capped = raw.min(self.backoff.max_delay_ms as f64);
        let ms = if self.backoff.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.5..=1.5);
            capped * factor
        } else {
            capped
        };
        Duration::from_millis(ms.round() as u64)
    }
}

/// Builds the retry policy for a node.
///
/// The attempt budget comes from `node.max_retries`, falling back to the
/// graph attribute `default_max_retry` when the node does not set one.
/// Backoff shape is tunable through the graph attributes
/// `retry_initial_delay_ms`, `retry_backoff_multiplier`,
/// `retry_max_delay_ms`, and `retry_jitter`.
pub fn build_retry_policy(node: &Node, graph: &Graph) -> RetryPolicy {
    let retries = if node.max_retries > 0 {
        node.max_retries
    } else {
        graph
            .attributes
            .get("default_max_retry")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    };

    let mut backoff = BackoffConfig::default();
    if let Some(v) = graph.attributes.get("retry_initial_delay_ms") {
        if let Ok(ms) = v.parse() {
            backoff.initial_delay_ms = ms;
        }
    }
    if let Some(v) = graph.attributes.get("retry_backoff_multiplier") {
        if let Ok(m) = v.parse() {
            backoff.multiplier = m;
        }
    }
    if let Some(v) = graph.attributes.get("retry_max_delay_ms") {
        if let Ok(ms) = v.parse() {
            backoff.max_delay_ms = ms;
        }
    }
    if let Some(v) = graph.attributes.get("retry_jitter") {
        backoff.jitter = matches!(v.as_str(), "true" | "yes" | "1");
    }

    RetryPolicy {
        max_attempts: retries + 1,
        backoff,
    }
}
