//! Tool-output truncation: two-stage character + line shaping.
//!
//! Stage 1 caps characters (HEAD_TAIL keeps both ends around a marker, TAIL
//! keeps the end behind a marker) and always runs first so a single
//! million-character line cannot defeat the line stage. Stage 2 caps line
//! counts with a head/tail split and one omission marker.

use std::collections::HashMap;

/// How the character cap keeps content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationMode {
    /// Keep the first and last `max/2` characters around a marker.
    HeadTail,
    /// Keep only the last `max` characters behind a marker.
    Tail,
}

/// Character-stage configuration for one tool.
#[derive(Debug, Clone, Copy)]
pub struct TruncationConfig {
    pub max_chars: usize,
    pub mode: TruncationMode,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            max_chars: 30_000,
            mode: TruncationMode::HeadTail,
        }
    }
}

/// Default character caps per tool.
pub fn default_char_limits() -> HashMap<&'static str, TruncationConfig> {
    HashMap::from([
        ("read_file", TruncationConfig { max_chars: 50_000, mode: TruncationMode::HeadTail }),
        ("shell", TruncationConfig { max_chars: 30_000, mode: TruncationMode::HeadTail }),
        ("grep", TruncationConfig { max_chars: 20_000, mode: TruncationMode::Tail }),
        ("glob", TruncationConfig { max_chars: 20_000, mode: TruncationMode::Tail }),
        ("edit_file", TruncationConfig { max_chars: 10_000, mode: TruncationMode::Tail }),
        ("apply_patch", TruncationConfig { max_chars: 10_000, mode: TruncationMode::Tail }),
        ("write_file", TruncationConfig { max_chars: 1_000, mode: TruncationMode::Tail }),
        ("spawn_agent", TruncationConfig { max_chars: 20_000, mode: TruncationMode::HeadTail }),
    ])
}

/// Default line caps per tool; tools absent here skip the line stage.
pub fn default_line_limits() -> HashMap<&'static str, usize> {
    HashMap::from([("shell", 256), ("grep", 200), ("glob", 500)])
}

/// Stage 1: character cap. Returns the input unchanged when within limits.
pub fn truncate_chars(output: &str, config: &TruncationConfig) -> String {
    let len = output.chars().count();
    if len <= config.max_chars {
        return output.to_string();
    }
    let removed = len - config.max_chars;

    match config.mode {
        TruncationMode::HeadTail => {
            let marker = format!(
                "\n\n[WARNING: Output truncated. {} characters removed from the middle. \
                 Full output available in the tool-call end event.]\n\n",
                removed
            );
            // Kept content plus marker stays within max_chars, so applying
            // the same cap twice is a no-op on the second pass.
            let budget = config.max_chars.saturating_sub(marker.chars().count());
            let half = budget / 2;
            let head: String = output.chars().take(half).collect();
            let tail: String = output
                .chars()
                .skip(len.saturating_sub(budget - half))
                .collect();
            format!("{}{}{}", head, marker, tail)
        }
        TruncationMode::Tail => {
            let marker = format!(
                "[WARNING: Output truncated. First {} characters removed.]\n\n",
                removed
            );
            let budget = config.max_chars.saturating_sub(marker.chars().count());
            let tail: String = output
                .chars()
                .skip(len.saturating_sub(budget))
                .collect();
            format!("{}{}", marker, tail)
        }
    }
}

/// Stage 2: line cap. Keeps the first `max/2` and last `max - max/2` lines
/// around a single omission marker.
pub fn truncate_lines(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.split('\n').collect();
    if lines.len() <= max_lines {
        return output.to_string();
    }
    let head_count = max_lines / 2;
    let tail_count = max_lines - head_count;
    let omitted = lines.len() - head_count - tail_count;
    format!(
        "{}\n[... {} lines omitted ...]\n{}",
        lines[..head_count].join("\n"),
        omitted,
        lines[lines.len() - tail_count..].join("\n")
    )
}

/// Full pipeline for one tool's output: characters first, then lines.
pub fn truncate_tool_output(output: &str, tool_name: &str) -> String {
    let char_limits = default_char_limits();
    let config = char_limits
        .get(tool_name)
        .copied()
        .unwrap_or_default();
    let result = truncate_chars(output, &config);

    match default_line_limits().get(tool_name) {
        Some(&max_lines) => truncate_lines(&result, max_lines),
        None => result,
    }
}
