//! Guard-condition expressions: `key=value && key!=value`.
//!
//! Conditions appear on edges and are evaluated against the current outcome
//! and context. The grammar is a conjunction of equality clauses; whitespace
//! around `=`, `!=`, and `&&` is ignored, and the empty expression is true.

use thiserror::Error;

use crate::context::Context;
use crate::outcome::Outcome;

/// Comparison operator of one clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
}

/// One `key op value` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub key: String,
    pub op: Op,
    pub value: String,
}

/// Malformed condition expression.
#[derive(Debug, Error)]
#[error("invalid condition clause `{clause}`")]
pub struct ConditionError {
    pub clause: String,
}

/// Parses a condition expression into clauses.
///
/// The empty (or all-whitespace) expression parses to no clauses.
pub fn parse_condition(expr: &str) -> Result<Vec<Clause>, ConditionError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(Vec::new());
    }
    let mut clauses = Vec::new();
    for raw in expr.split("&&") {
        let raw = raw.trim();
        // `!=` must be tried before `=`: `a!=b` contains both.
        let (key, op, value) = if let Some((k, v)) = raw.split_once("!=") {
            (k, Op::Ne, v)
        } else if let Some((k, v)) = raw.split_once('=') {
            (k, Op::Eq, v)
        } else {
            return Err(ConditionError {
                clause: raw.to_string(),
            });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ConditionError {
                clause: raw.to_string(),
            });
        }
        clauses.push(Clause {
            key: key.to_string(),
            op,
            value: value.trim().to_string(),
        });
    }
    Ok(clauses)
}

/// Resolves a clause key against the outcome and context.
///
/// `outcome` is the lowercase status name; `preferred_label` is the outcome
/// field verbatim; `context.X` falls back from `X` to the literal
/// `context.X` key; bare names resolve via the context. Missing keys are the
/// empty string.
pub fn resolve_key(key: &str, outcome: &Outcome, ctx: &Context) -> String {
    match key {
        "outcome" => outcome.status.as_str().to_string(),
        "preferred_label" => outcome.preferred_label.clone(),
        _ => {
            if let Some(stripped) = key.strip_prefix("context.") {
                ctx.get_string(stripped)
                    .or_else(|| ctx.get_string(key))
                    .unwrap_or_default()
            } else {
                ctx.get_string(key).unwrap_or_default()
            }
        }
    }
}

/// Evaluates a condition expression.
///
/// All clauses are AND-combined. An unparsable expression evaluates to
/// false; syntactic validation is the validator's job, not the evaluator's.
pub fn evaluate_condition(expr: &str, outcome: &Outcome, ctx: &Context) -> bool {
    let clauses = match parse_condition(expr) {
        Ok(c) => c,
        Err(_) => return false,
    };
    clauses.iter().all(|clause| {
        let actual = resolve_key(&clause.key, outcome, ctx);
        match clause.op {
            Op::Eq => actual == clause.value,
            Op::Ne => actual != clause.value,
        }
    })
}
