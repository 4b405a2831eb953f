//! Deterministic edge selection.
//!
//! Given a node's outgoing edges, the current outcome, and the context, pick
//! at most one edge. The procedure runs five steps in priority order; the
//! first step producing a non-empty candidate set wins, and candidates are
//! tiebroken by weight descending then target id ascending. Same inputs
//! always select the same edge.

use crate::conditions::evaluate_condition;
use crate::context::Context;
use crate::graph::Edge;
use crate::outcome::Outcome;

/// Selects the next edge, or `None` when `edges` is empty.
///
/// Steps, per the routing contract:
/// 1. Edges whose non-empty condition evaluates true.
/// 2. Unconditional edges whose normalized label equals the normalized
///    preferred label.
/// 3. The first edge targeting an id from `suggested_next_ids`, in order.
/// 4. The best unconditional edge.
/// 5. Fallback: the best edge over the full list.
pub fn select_edge<'a>(
    edges: &[&'a Edge],
    outcome: &Outcome,
    ctx: &Context,
) -> Option<&'a Edge> {
    if edges.is_empty() {
        return None;
    }

    // Step 1: condition match.
    let matching: Vec<&Edge> = edges
        .iter()
        .copied()
        .filter(|e| !e.condition.is_empty() && evaluate_condition(&e.condition, outcome, ctx))
        .collect();
    if let Some(edge) = best_edge(&matching) {
        return Some(edge);
    }

    // Step 2: preferred label over unconditional edges.
    if !outcome.preferred_label.is_empty() {
        let wanted = normalize_label(&outcome.preferred_label);
        let labeled: Vec<&Edge> = edges
            .iter()
            .copied()
            .filter(|e| e.condition.is_empty() && normalize_label(&e.label) == wanted)
            .collect();
        if let Some(edge) = best_edge(&labeled) {
            return Some(edge);
        }
    }

    // Step 3: suggested next ids, in hint order.
    for id in &outcome.suggested_next_ids {
        if let Some(edge) = edges.iter().copied().find(|e| &e.to_node == id) {
            return Some(edge);
        }
    }

    // Step 4: best unconditional edge.
    let unconditional: Vec<&Edge> = edges
        .iter()
        .copied()
        .filter(|e| e.condition.is_empty())
        .collect();
    if let Some(edge) = best_edge(&unconditional) {
        return Some(edge);
    }

    // Step 5: least-bad fallback over everything.
    best_edge(edges)
}

/// Weight-descending, then target-id-ascending tiebreak.
fn best_edge<'a>(candidates: &[&'a Edge]) -> Option<&'a Edge> {
    candidates.iter().copied().min_by(|a, b| {
        b.weight
            .cmp(&a.weight)
            .then_with(|| a.to_node.cmp(&b.to_node))
    })
}

/// Normalizes an edge label for preferred-label matching.
///
/// Lowercases, trims, and strips a single-character accelerator prefix in
/// any of the forms `[x] label`, `x) label`, or `x - label`.
pub(crate) fn normalize_label(label: &str) -> String {
    let s = label.trim().to_lowercase();
    let chars: Vec<char> = s.chars().collect();

    // `[x] label`
    if chars.len() >= 3 && chars[0] == '[' && chars[2] == ']' {
        return chars[3..].iter().collect::<String>().trim().to_string();
    }
    // `x) label`
    if chars.len() >= 2 && chars[1] == ')' {
        return chars[2..].iter().collect::<String>().trim().to_string();
    }
    // `x - label`
    if chars.len() >= 3 && chars[1] == ' ' && chars[2] == '-' {
        return chars[3..].iter().collect::<String>().trim().to_string();
    }
    s
}
