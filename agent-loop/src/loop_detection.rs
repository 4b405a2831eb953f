//! Tool-call loop detection.
//!
//! Each executed call leaves a signature `(tool_name, canonical_arguments)`.
//! After every round the detector inspects the last `window` signatures: an
//! all-identical window, or a window tiled by a short cycle, produces an
//! advisory message the session injects as steering.

use serde_json::Value;

/// One tool call, reduced to a comparable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallSignature {
    pub tool_name: String,
    pub canonical_arguments: String,
}

/// Builds a signature from a call's name and arguments.
///
/// Arguments are re-serialized through `serde_json`, whose object maps are
/// key-ordered, so logically equal argument sets compare equal regardless of
/// the order the model emitted them in.
pub fn make_signature(tool_name: &str, arguments: &Value) -> ToolCallSignature {
    ToolCallSignature {
        tool_name: tool_name.to_string(),
        canonical_arguments: canonicalize(arguments),
    }
}

fn canonicalize(value: &Value) -> String {
    // serde_json's Map is sorted by key; serializing normalizes spacing and
    // number representations as well.
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

/// Inspects the signature window and returns an advisory when a loop shows.
///
/// Priorities: all-identical first, then the shortest cycle whose period is
/// at most `window / 2` and which tiles the window exactly.
pub fn detect_loop(signatures: &[ToolCallSignature], window: usize) -> Option<String> {
    if window == 0 || signatures.len() < window {
        return None;
    }
    let recent = &signatures[signatures.len() - window..];

    if recent.iter().all(|s| s == &recent[0]) {
        return Some(format!(
            "You have called `{}` with identical arguments {} times in a row; \
             the calls are not making progress. Try a different approach.",
            recent[0].tool_name, window
        ));
    }

    for period in 2..=window / 2 {
        if window % period != 0 {
            continue;
        }
        let tiles = (period..window).all(|i| recent[i] == recent[i - period]);
        if tiles {
            let cycle: Vec<&str> = recent[..period]
                .iter()
                .map(|s| s.tool_name.as_str())
                .collect();
            return Some(format!(
                "You are repeating a cycle of {} tool calls ({}) without making \
                 progress. Try a different approach.",
                period,
                cycle.join(" -> ")
            ));
        }
    }

    None
}
