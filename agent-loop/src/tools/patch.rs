//! Structured patch applier: multi-file Add/Update/Delete with move support.
//!
//! Accepts a sentinel-framed text document:
//!
//! ```text
//! *** Begin Patch
//! *** Update File: src/main.rs
//! *** Move to: src/bin/main.rs
//! @@ fn main
//!  fn main() {
//! -    println!("old");
//! +    println!("new");
//!  }
//! *** End Patch
//! ```
//!
//! Hunks anchor on the expected contiguous block (context + removed lines,
//! in order): exact match first, then whitespace-normalized. A miss fails
//! the tool with the hunk's context hint echoed.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::environment::ExecutionEnvironment;

use super::{require_str, RegisteredTool, ToolDefinition, ToolError, ToolExecutor, ToolRegistry};

const BEGIN: &str = "*** Begin Patch";
const END: &str = "*** End Patch";
const ADD_FILE: &str = "*** Add File:";
const DELETE_FILE: &str = "*** Delete File:";
const UPDATE_FILE: &str = "*** Update File:";
const MOVE_TO: &str = "*** Move to:";
const END_OF_FILE: &str = "*** End of File";

#[derive(Debug, PartialEq)]
enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

#[derive(Debug)]
struct Hunk {
    context_hint: String,
    lines: Vec<HunkLine>,
}

impl Hunk {
    /// Lines that must appear contiguously in the existing file.
    fn expected(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }

    /// Lines that replace the matched block.
    fn replacement(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Add(s) => Some(s.as_str()),
                HunkLine::Remove(_) => None,
            })
            .collect()
    }
}

#[derive(Debug)]
enum PatchOp {
    Add { path: String, content: String },
    Delete { path: String },
    Update {
        path: String,
        move_to: Option<String>,
        hunks: Vec<Hunk>,
    },
}

fn parse_patch(text: &str) -> Result<Vec<PatchOp>, ToolError> {
    let trimmed = text.trim();
    let start = trimmed
        .find(BEGIN)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing `{}`", BEGIN)))?;
    let end = trimmed
        .rfind(END)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing `{}`", END)))?;
    if end < start {
        return Err(ToolError::InvalidArguments(
            "patch sentinels out of order".to_string(),
        ));
    }
    let body = &trimmed[start + BEGIN.len()..end];
    let lines: Vec<&str> = body.split('\n').collect();

    let mut ops = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim_end();
        if let Some(path) = line.trim().strip_prefix(ADD_FILE) {
            let path = path.trim().to_string();
            i += 1;
            let mut content = String::new();
            let mut first = true;
            while i < lines.len() && !lines[i].trim_start().starts_with("***") {
                if let Some(added) = lines[i].strip_prefix('+') {
                    if !first {
                        content.push('\n');
                    }
                    content.push_str(added);
                    first = false;
                }
                i += 1;
            }
            ops.push(PatchOp::Add { path, content });
        } else if let Some(path) = line.trim().strip_prefix(DELETE_FILE) {
            ops.push(PatchOp::Delete {
                path: path.trim().to_string(),
            });
            i += 1;
        } else if let Some(path) = line.trim().strip_prefix(UPDATE_FILE) {
            let path = path.trim().to_string();
            i += 1;
            let mut move_to = None;
            if i < lines.len() {
                if let Some(dest) = lines[i].trim().strip_prefix(MOVE_TO) {
                    move_to = Some(dest.trim().to_string());
                    i += 1;
                }
            }
            let mut hunks = Vec::new();
            while i < lines.len() {
                let current = lines[i].trim_end();
                if current.trim() == END_OF_FILE {
                    i += 1;
                    continue;
                }
                if current.trim_start().starts_with("***") {
                    break;
                }
                if let Some(hint) = current.trim_start().strip_prefix("@@") {
                    let context_hint = hint.trim().to_string();
                    i += 1;
                    let mut hunk_lines = Vec::new();
                    while i < lines.len() {
                        let l = lines[i];
                        if l.trim_start().starts_with("@@")
                            || l.trim_start().starts_with("***")
                        {
                            break;
                        }
                        if let Some(rest) = l.strip_prefix('+') {
                            hunk_lines.push(HunkLine::Add(rest.to_string()));
                        } else if let Some(rest) = l.strip_prefix('-') {
                            hunk_lines.push(HunkLine::Remove(rest.to_string()));
                        } else if let Some(rest) = l.strip_prefix(' ') {
                            hunk_lines.push(HunkLine::Context(rest.to_string()));
                        } else if l.is_empty() {
                            hunk_lines.push(HunkLine::Context(String::new()));
                        }
                        i += 1;
                    }
                    hunks.push(Hunk {
                        context_hint,
                        lines: hunk_lines,
                    });
                } else {
                    i += 1;
                }
            }
            if hunks.is_empty() {
                return Err(ToolError::InvalidArguments(format!(
                    "update for {} has no hunks",
                    path
                )));
            }
            ops.push(PatchOp::Update {
                path,
                move_to,
                hunks,
            });
        } else {
            i += 1;
        }
    }

    if ops.is_empty() {
        return Err(ToolError::InvalidArguments(
            "patch has no operations".to_string(),
        ));
    }
    Ok(ops)
}

fn normalize_ws(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Finds the start index of `expected` as a contiguous block in `file_lines`.
fn find_block(file_lines: &[&str], expected: &[&str]) -> Option<usize> {
    if expected.is_empty() || expected.len() > file_lines.len() {
        return None;
    }
    // Exact match first.
    let exact = file_lines
        .windows(expected.len())
        .position(|window| window == expected);
    if exact.is_some() {
        return exact;
    }
    // Whitespace-normalized fallback.
    let normalized_expected: Vec<String> = expected.iter().map(|l| normalize_ws(l)).collect();
    file_lines.windows(expected.len()).position(|window| {
        window
            .iter()
            .zip(&normalized_expected)
            .all(|(line, want)| &normalize_ws(line) == want)
    })
}

fn apply_hunks(path: &str, content: &str, hunks: &[Hunk]) -> Result<String, ToolError> {
    let mut lines: Vec<String> = content.split('\n').map(String::from).collect();
    for hunk in hunks {
        let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let expected = hunk.expected();
        let start = find_block(&line_refs, &expected).ok_or_else(|| {
            ToolError::Failed(format!(
                "hunk `@@ {}` does not match {}: expected block not found",
                hunk.context_hint, path
            ))
        })?;
        let replacement: Vec<String> =
            hunk.replacement().into_iter().map(String::from).collect();
        lines.splice(start..start + expected.len(), replacement);
    }
    Ok(lines.join("\n"))
}

/// Applies a parsed patch against the environment; returns a summary line.
pub async fn apply_patch(
    patch_text: &str,
    env: &dyn ExecutionEnvironment,
) -> Result<String, ToolError> {
    let ops = parse_patch(patch_text)?;
    let mut applied = 0usize;

    for op in &ops {
        match op {
            PatchOp::Add { path, content } => {
                env.write_file(path, content).await?;
                applied += 1;
            }
            PatchOp::Delete { path } => {
                env.delete_file(path).await?;
                applied += 1;
            }
            PatchOp::Update {
                path,
                move_to,
                hunks,
            } => {
                let content = env.read_file(path, None, None).await?;
                let updated = apply_hunks(path, &content, hunks)?;
                match move_to {
                    Some(dest) => {
                        env.write_file(dest, &updated).await?;
                        env.delete_file(path).await?;
                    }
                    None => env.write_file(path, &updated).await?,
                }
                applied += 1;
            }
        }
    }

    Ok(format!("Applied {} operation(s).", applied))
}

/// Tool wrapper around [`apply_patch`].
pub struct ApplyPatchExecutor;

#[async_trait]
impl ToolExecutor for ApplyPatchExecutor {
    async fn execute(
        &self,
        arguments: &Value,
        env: &dyn ExecutionEnvironment,
    ) -> Result<String, ToolError> {
        let patch_text = require_str(arguments, "patch_text")?;
        apply_patch(patch_text, env).await
    }
}

fn apply_patch_definition() -> ToolDefinition {
    ToolDefinition {
        name: "apply_patch".to_string(),
        description: "Apply a multi-file patch. Frame with *** Begin Patch / *** End Patch; \
                      operations: *** Add File: path (+ lines), *** Delete File: path, \
                      *** Update File: path (optional *** Move to: path) with @@ hunks of \
                      space/-/+ lines."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "patch_text": {"type": "string", "description": "Full patch document"}
            },
            "required": ["patch_text"]
        }),
    }
}

/// Registers the patch applier (for profiles that use it instead of edit_file).
pub fn register_apply_patch(registry: &mut ToolRegistry) {
    registry.register(RegisteredTool::new(
        apply_patch_definition(),
        std::sync::Arc::new(ApplyPatchExecutor),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::LocalExecutionEnvironment;

    fn env(dir: &std::path::Path) -> LocalExecutionEnvironment {
        LocalExecutionEnvironment::with_working_dir(dir.display().to_string())
    }

    #[tokio::test]
    async fn add_file_writes_plus_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        let patch = "*** Begin Patch\n*** Add File: notes.txt\n+first\n+second\n*** End Patch";
        let out = apply_patch(patch, &e).await.expect("apply");
        assert_eq!(out, "Applied 1 operation(s).");
        assert_eq!(
            e.read_file("notes.txt", None, None).await.expect("read"),
            "first\nsecond"
        );
    }

    #[tokio::test]
    async fn delete_file_removes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        e.write_file("gone.txt", "bye").await.expect("write");
        let patch = "*** Begin Patch\n*** Delete File: gone.txt\n*** End Patch";
        apply_patch(patch, &e).await.expect("apply");
        assert!(!e.file_exists("gone.txt").await);
    }

    #[tokio::test]
    async fn update_replaces_hunk_block() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        e.write_file("main.rs", "fn main() {\n    println!(\"old\");\n}")
            .await
            .expect("write");
        let patch = concat!(
            "*** Begin Patch\n",
            "*** Update File: main.rs\n",
            "@@ fn main\n",
            " fn main() {\n",
            "-    println!(\"old\");\n",
            "+    println!(\"new\");\n",
            " }\n",
            "*** End Patch"
        );
        apply_patch(patch, &e).await.expect("apply");
        let content = e.read_file("main.rs", None, None).await.expect("read");
        assert!(content.contains("new"));
        assert!(!content.contains("old"));
    }

    #[tokio::test]
    async fn update_with_move_renames() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        e.write_file("a.txt", "keep\nchange me").await.expect("write");
        let patch = concat!(
            "*** Begin Patch\n",
            "*** Update File: a.txt\n",
            "*** Move to: b.txt\n",
            "@@ keep\n",
            " keep\n",
            "-change me\n",
            "+changed\n",
            "*** End Patch"
        );
        apply_patch(patch, &e).await.expect("apply");
        assert!(!e.file_exists("a.txt").await);
        assert_eq!(
            e.read_file("b.txt", None, None).await.expect("read"),
            "keep\nchanged"
        );
    }

    #[tokio::test]
    async fn whitespace_normalized_match_is_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        // File uses tabs; hunk uses spaces.
        e.write_file("t.txt", "\tindented line\nother").await.expect("write");
        let patch = concat!(
            "*** Begin Patch\n",
            "*** Update File: t.txt\n",
            "@@ indented\n",
            "-  indented line\n",
            "+replaced\n",
            "*** End Patch"
        );
        apply_patch(patch, &e).await.expect("apply");
        let content = e.read_file("t.txt", None, None).await.expect("read");
        assert_eq!(content, "replaced\nother");
    }

    #[tokio::test]
    async fn unmatched_hunk_echoes_context_hint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        e.write_file("x.txt", "real content").await.expect("write");
        let patch = concat!(
            "*** Begin Patch\n",
            "*** Update File: x.txt\n",
            "@@ some anchor\n",
            "-does not exist\n",
            "+whatever\n",
            "*** End Patch"
        );
        let err = apply_patch(patch, &e).await.expect_err("no match");
        assert!(err.to_string().contains("some anchor"));
    }

    #[tokio::test]
    async fn missing_sentinels_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        let err = apply_patch("*** Add File: x\n+hi", &e).await.expect_err("no frame");
        assert!(err.to_string().contains("Begin Patch"));
    }

    #[tokio::test]
    async fn multi_file_patch_applies_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        e.write_file("old.txt", "delete me").await.expect("write");
        let patch = concat!(
            "*** Begin Patch\n",
            "*** Add File: new.txt\n",
            "+hello\n",
            "*** Delete File: old.txt\n",
            "*** End Patch"
        );
        let out = apply_patch(patch, &e).await.expect("apply");
        assert_eq!(out, "Applied 2 operation(s).");
        assert!(e.file_exists("new.txt").await);
        assert!(!e.file_exists("old.txt").await);
    }
}
