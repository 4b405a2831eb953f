//! The shared core tools: read, write, edit, shell, grep, glob.
//!
//! Every provider profile starts from these; schemas and executors delegate
//! to the [`ExecutionEnvironment`] so the same tools run anywhere.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::environment::{ExecutionEnvironment, GrepOptions};

use super::{
    opt_bool, opt_str, opt_u64, require_str, RegisteredTool, ToolDefinition, ToolError,
    ToolExecutor, ToolRegistry,
};

const DEFAULT_READ_LIMIT: usize = 2000;
const DEFAULT_SHELL_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_GREP_MAX_RESULTS: usize = 100;

/// Reads a file and returns line-numbered content.
pub struct ReadFileExecutor;

#[async_trait]
impl ToolExecutor for ReadFileExecutor {
    async fn execute(
        &self,
        arguments: &Value,
        env: &dyn ExecutionEnvironment,
    ) -> Result<String, ToolError> {
        let path = require_str(arguments, "file_path")?;
        let offset = opt_u64(arguments, "offset").map(|n| n as usize);
        let limit = opt_u64(arguments, "limit")
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_READ_LIMIT);
        let content = env.read_file(path, offset, Some(limit)).await?;
        let start = offset.unwrap_or(1).max(1);
        let numbered: Vec<String> = content
            .lines()
            .enumerate()
            .map(|(i, line)| format!("{:>4} | {}", start + i, line))
            .collect();
        Ok(numbered.join("\n"))
    }
}

/// Writes full file content, creating parents.
pub struct WriteFileExecutor;

#[async_trait]
impl ToolExecutor for WriteFileExecutor {
    async fn execute(
        &self,
        arguments: &Value,
        env: &dyn ExecutionEnvironment,
    ) -> Result<String, ToolError> {
        let path = require_str(arguments, "file_path")?;
        let content = require_str(arguments, "content")?;
        env.write_file(path, content).await?;
        Ok(format!("Wrote {} bytes to {}", content.len(), path))
    }
}

/// Replaces an exact string occurrence in a file.
pub struct EditFileExecutor;

#[async_trait]
impl ToolExecutor for EditFileExecutor {
    async fn execute(
        &self,
        arguments: &Value,
        env: &dyn ExecutionEnvironment,
    ) -> Result<String, ToolError> {
        let path = require_str(arguments, "file_path")?;
        let old = require_str(arguments, "old_string")?;
        let new = require_str(arguments, "new_string")?;
        let replace_all = opt_bool(arguments, "replace_all").unwrap_or(false);

        if old.is_empty() {
            return Err(ToolError::InvalidArguments(
                "old_string must not be empty".to_string(),
            ));
        }

        let content = env.read_file(path, None, None).await?;
        let count = content.matches(old).count();
        if count == 0 {
            return Err(ToolError::Failed(format!(
                "old_string not found in {}",
                path
            )));
        }
        if count > 1 && !replace_all {
            return Err(ToolError::Failed(format!(
                "old_string found {} times in {}. Provide more context to make it \
                 unique, or set replace_all=true.",
                count, path
            )));
        }

        let new_content = if replace_all {
            content.replace(old, new)
        } else {
            content.replacen(old, new, 1)
        };
        env.write_file(path, &new_content).await?;
        let replacements = if replace_all { count } else { 1 };
        Ok(format!("Made {} replacement(s) in {}", replacements, path))
    }
}

/// Runs a shell command and reports stdout/stderr/exit code.
pub struct ShellExecutor;

#[async_trait]
impl ToolExecutor for ShellExecutor {
    async fn execute(
        &self,
        arguments: &Value,
        env: &dyn ExecutionEnvironment,
    ) -> Result<String, ToolError> {
        let command = require_str(arguments, "command")?;
        let timeout_ms = opt_u64(arguments, "timeout_ms").unwrap_or(DEFAULT_SHELL_TIMEOUT_MS);
        let result = env.exec_command(command, timeout_ms).await?;

        let mut parts = Vec::new();
        if !result.stdout.is_empty() {
            parts.push(result.stdout.clone());
        }
        if !result.stderr.is_empty() {
            parts.push(format!("STDERR: {}", result.stderr));
        }
        parts.push(format!("Exit code: {}", result.exit_code));
        if result.timed_out {
            parts.push(format!("(timed out after {}ms)", result.duration_ms));
        }
        Ok(parts.join("\n"))
    }
}

/// Regex search over file contents.
pub struct GrepExecutor;

#[async_trait]
impl ToolExecutor for GrepExecutor {
    async fn execute(
        &self,
        arguments: &Value,
        env: &dyn ExecutionEnvironment,
    ) -> Result<String, ToolError> {
        let pattern = require_str(arguments, "pattern")?;
        let path = opt_str(arguments, "path").unwrap_or(".");
        let options = GrepOptions {
            case_insensitive: opt_bool(arguments, "case_insensitive").unwrap_or(false),
            glob_filter: opt_str(arguments, "glob_filter").map(String::from),
            max_results: opt_u64(arguments, "max_results")
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_GREP_MAX_RESULTS),
        };
        Ok(env.grep(pattern, path, &options).await?)
    }
}

/// Glob match, newest files first.
pub struct GlobExecutor;

#[async_trait]
impl ToolExecutor for GlobExecutor {
    async fn execute(
        &self,
        arguments: &Value,
        env: &dyn ExecutionEnvironment,
    ) -> Result<String, ToolError> {
        let pattern = require_str(arguments, "pattern")?;
        let path = opt_str(arguments, "path").unwrap_or(".");
        let matches = env.glob(pattern, path).await?;
        if matches.is_empty() {
            Ok("No files found.".to_string())
        } else {
            Ok(matches.join("\n"))
        }
    }
}

fn read_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: "read_file".to_string(),
        description: "Read a file from the filesystem. Returns line-numbered content."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "description": "Absolute path to the file"},
                "offset": {"type": "integer", "description": "1-based line number to start reading from"},
                "limit": {"type": "integer", "description": "Max lines to read (default: 2000)"}
            },
            "required": ["file_path"]
        }),
    }
}

fn write_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: "write_file".to_string(),
        description: "Write content to a file. Creates the file and parent directories if needed."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "description": "Absolute path"},
                "content": {"type": "string", "description": "The full file content"}
            },
            "required": ["file_path", "content"]
        }),
    }
}

fn edit_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: "edit_file".to_string(),
        description: "Replace an exact string occurrence in a file.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "description": "Path to the file"},
                "old_string": {"type": "string", "description": "Exact text to find"},
                "new_string": {"type": "string", "description": "Replacement text"},
                "replace_all": {"type": "boolean", "description": "Replace all occurrences (default: false)"}
            },
            "required": ["file_path", "old_string", "new_string"]
        }),
    }
}

fn shell_definition() -> ToolDefinition {
    ToolDefinition {
        name: "shell".to_string(),
        description: "Execute a shell command. Returns stdout, stderr, and exit code."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "The command to run"},
                "timeout_ms": {"type": "integer", "description": "Override default timeout in milliseconds"},
                "description": {"type": "string", "description": "Human-readable description"}
            },
            "required": ["command"]
        }),
    }
}

fn grep_definition() -> ToolDefinition {
    ToolDefinition {
        name: "grep".to_string(),
        description: "Search file contents using regex patterns.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Regex pattern"},
                "path": {"type": "string", "description": "Directory or file to search"},
                "glob_filter": {"type": "string", "description": "File pattern filter (e.g., '*.rs')"},
                "case_insensitive": {"type": "boolean", "description": "Case insensitive search"},
                "max_results": {"type": "integer", "description": "Maximum results (default: 100)"}
            },
            "required": ["pattern"]
        }),
    }
}

fn glob_definition() -> ToolDefinition {
    ToolDefinition {
        name: "glob".to_string(),
        description: "Find files matching a glob pattern.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Glob pattern (e.g., '**/*.rs')"},
                "path": {"type": "string", "description": "Base directory"}
            },
            "required": ["pattern"]
        }),
    }
}

/// Registers all core tools, skipping any in `exclude`.
pub fn register_core_tools(registry: &mut ToolRegistry, exclude: &[&str]) {
    let tools: Vec<(ToolDefinition, Arc<dyn ToolExecutor>)> = vec![
        (read_file_definition(), Arc::new(ReadFileExecutor)),
        (write_file_definition(), Arc::new(WriteFileExecutor)),
        (edit_file_definition(), Arc::new(EditFileExecutor)),
        (shell_definition(), Arc::new(ShellExecutor)),
        (grep_definition(), Arc::new(GrepExecutor)),
        (glob_definition(), Arc::new(GlobExecutor)),
    ];
    for (definition, executor) in tools {
        if exclude.contains(&definition.name.as_str()) {
            continue;
        }
        registry.register(RegisteredTool::new(definition, executor));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::LocalExecutionEnvironment;
    use serde_json::json;

    fn env(dir: &std::path::Path) -> LocalExecutionEnvironment {
        LocalExecutionEnvironment::with_working_dir(dir.display().to_string())
    }

    #[test]
    fn registers_all_six_by_default() {
        let mut reg = ToolRegistry::new();
        register_core_tools(&mut reg, &[]);
        let names: Vec<String> = reg.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec!["read_file", "write_file", "edit_file", "shell", "grep", "glob"]
        );
    }

    #[test]
    fn exclude_skips_tools() {
        let mut reg = ToolRegistry::new();
        register_core_tools(&mut reg, &["edit_file"]);
        assert!(reg.get("edit_file").is_none());
        assert_eq!(reg.len(), 5);
    }

    #[tokio::test]
    async fn read_file_outputs_line_numbers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        e.write_file("f.txt", "alpha\nbeta").await.expect("write");
        let out = ReadFileExecutor
            .execute(&json!({"file_path": "f.txt"}), &e)
            .await
            .expect("read");
        assert_eq!(out, "   1 | alpha\n   2 | beta");
    }

    #[tokio::test]
    async fn read_file_offset_numbers_from_offset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        e.write_file("f.txt", "a\nb\nc\nd").await.expect("write");
        let out = ReadFileExecutor
            .execute(&json!({"file_path": "f.txt", "offset": 3, "limit": 2}), &e)
            .await
            .expect("read");
        assert_eq!(out, "   3 | c\n   4 | d");
    }

    #[tokio::test]
    async fn write_file_reports_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        let out = WriteFileExecutor
            .execute(&json!({"file_path": "out.txt", "content": "hello"}), &e)
            .await
            .expect("write");
        assert_eq!(out, "Wrote 5 bytes to out.txt");
        assert!(e.file_exists("out.txt").await);
    }

    #[tokio::test]
    async fn edit_file_single_occurrence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        e.write_file("f.txt", "one two three").await.expect("write");
        let out = EditFileExecutor
            .execute(
                &json!({"file_path": "f.txt", "old_string": "two", "new_string": "2"}),
                &e,
            )
            .await
            .expect("edit");
        assert_eq!(out, "Made 1 replacement(s) in f.txt");
        assert_eq!(e.read_file("f.txt", None, None).await.expect("read"), "one 2 three");
    }

    #[tokio::test]
    async fn edit_file_rejects_ambiguous_match() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        e.write_file("f.txt", "x x x").await.expect("write");
        let err = EditFileExecutor
            .execute(
                &json!({"file_path": "f.txt", "old_string": "x", "new_string": "y"}),
                &e,
            )
            .await
            .expect_err("ambiguous");
        assert!(err.to_string().contains("found 3 times"));
    }

    #[tokio::test]
    async fn edit_file_replace_all() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        e.write_file("f.txt", "x x x").await.expect("write");
        let out = EditFileExecutor
            .execute(
                &json!({"file_path": "f.txt", "old_string": "x", "new_string": "y", "replace_all": true}),
                &e,
            )
            .await
            .expect("edit");
        assert_eq!(out, "Made 3 replacement(s) in f.txt");
        assert_eq!(e.read_file("f.txt", None, None).await.expect("read"), "y y y");
    }

    #[tokio::test]
    async fn edit_file_missing_string_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        e.write_file("f.txt", "abc").await.expect("write");
        let err = EditFileExecutor
            .execute(
                &json!({"file_path": "f.txt", "old_string": "zzz", "new_string": "y"}),
                &e,
            )
            .await
            .expect_err("missing");
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn shell_formats_exit_code() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        let out = ShellExecutor
            .execute(&json!({"command": "echo hi"}), &e)
            .await
            .expect("shell");
        assert!(out.contains("hi"));
        assert!(out.contains("Exit code: 0"));
    }

    #[tokio::test]
    async fn glob_reports_no_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = env(dir.path());
        let out = GlobExecutor
            .execute(&json!({"pattern": "*.nope"}), &e)
            .await
            .expect("glob");
        assert_eq!(out, "No files found.");
    }
}
