//! System prompt assembly: five layers, lowest priority first.
//!
//! 1. Base instructions from the provider profile.
//! 2. Environment block (working directory, git, platform, date, model).
//! 3. Tool descriptions.
//! 4. Project docs, discovered from the git root down to the working
//!    directory under a 32 KiB budget.
//! 5. Caller-supplied user instructions.
//!
//! Git state is sampled through the `git` CLI with short timeouts; a missing
//! binary or a non-repo directory degrades to "not a repo".

use std::path::PathBuf;
use std::time::Duration;

use crate::environment::ExecutionEnvironment;
use crate::tools::ToolDefinition;

/// Total byte budget for project instruction files.
pub const PROMPT_BUDGET_BYTES: usize = 32 * 1024;

const GIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Sampled git state for the environment block.
#[derive(Debug, Clone, Default)]
pub struct GitContext {
    pub is_repo: bool,
    pub branch: String,
    pub modified_count: usize,
    pub untracked_count: usize,
    pub recent_commits: Vec<String>,
}

async fn git(args: &[&str], cwd: &str) -> Option<String> {
    let mut cmd = tokio::process::Command::new("git");
    cmd.args(args)
        .current_dir(cwd)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .stdin(std::process::Stdio::null());
    let output = tokio::time::timeout(GIT_TIMEOUT, cmd.output()).await.ok()?.ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Samples git state for `working_dir`; any failure reports "not a repo".
pub async fn get_git_context(working_dir: &str) -> GitContext {
    if git(&["rev-parse", "--is-inside-work-tree"], working_dir)
        .await
        .is_none()
    {
        return GitContext::default();
    }

    let mut ctx = GitContext {
        is_repo: true,
        branch: "unknown".to_string(),
        ..Default::default()
    };

    if let Some(branch) = git(&["rev-parse", "--abbrev-ref", "HEAD"], working_dir).await {
        ctx.branch = branch;
    }
    if let Some(status) = git(&["status", "--porcelain"], working_dir).await {
        for line in status.lines().filter(|l| !l.trim().is_empty()) {
            if line.starts_with("??") {
                ctx.untracked_count += 1;
            } else {
                ctx.modified_count += 1;
            }
        }
    }
    if let Some(log) = git(&["log", "--oneline", "-10"], working_dir).await {
        ctx.recent_commits = log.lines().map(String::from).collect();
    }
    ctx
}

async fn find_git_root(working_dir: &str) -> Option<PathBuf> {
    git(&["rev-parse", "--show-toplevel"], working_dir)
        .await
        .map(PathBuf::from)
}

/// Renders the `<environment>` block.
pub fn build_environment_context(
    env: &dyn ExecutionEnvironment,
    model: &str,
    git: &GitContext,
) -> String {
    let mut lines = vec![
        "<environment>".to_string(),
        format!("Working directory: {}", env.working_directory()),
        format!("Is git repository: {}", git.is_repo),
    ];
    if git.is_repo {
        lines.push(format!("Git branch: {}", git.branch));
    }
    lines.push(format!("Platform: {}", env.platform()));
    lines.push(format!("OS version: {}", env.os_version()));
    lines.push(format!(
        "Today's date: {}",
        chrono::Local::now().format("%Y-%m-%d")
    ));
    if !model.is_empty() {
        lines.push(format!("Model: {}", model));
    }
    lines.push("</environment>".to_string());
    lines.join("\n")
}

/// Instruction file names recognized for a provider, generic file first.
pub fn provider_doc_files(provider_id: &str) -> Vec<&'static str> {
    match provider_id {
        "anthropic" => vec!["AGENTS.md", "CLAUDE.md"],
        "openai" => vec!["AGENTS.md", ".codex/instructions.md"],
        "gemini" => vec!["AGENTS.md", "GEMINI.md"],
        _ => vec!["AGENTS.md"],
    }
}

/// Loads project instruction files from the git root (or working directory)
/// down to the working directory. Root files load first; deeper files come
/// later and therefore take precedence. The total is capped at
/// [`PROMPT_BUDGET_BYTES`]; the file that crosses the budget is truncated
/// with a marker and discovery stops.
pub async fn discover_project_docs(working_dir: &str, provider_id: &str) -> Vec<String> {
    let names = provider_doc_files(provider_id);
    let root = find_git_root(working_dir)
        .await
        .unwrap_or_else(|| PathBuf::from(working_dir));
    let work = PathBuf::from(working_dir);

    let mut search_dirs = vec![root.clone()];
    if let Ok(relative) = work.strip_prefix(&root) {
        let mut current = root.clone();
        for part in relative.components() {
            current = current.join(part);
            search_dirs.push(current.clone());
        }
    }

    let mut docs = Vec::new();
    let mut total = 0usize;
    for dir in search_dirs {
        for name in &names {
            let candidate = dir.join(name);
            if !candidate.is_file() {
                continue;
            }
            let Ok(bytes) = tokio::fs::read(&candidate).await else {
                continue;
            };
            let content = String::from_utf8_lossy(&bytes).into_owned();
            if total + content.len() > PROMPT_BUDGET_BYTES {
                let remaining = PROMPT_BUDGET_BYTES.saturating_sub(total);
                if remaining > 0 {
                    let cut: String = content.chars().take(remaining).collect();
                    docs.push(format!(
                        "{}\n[Project instructions truncated at 32KB]",
                        cut
                    ));
                }
                return docs;
            }
            total += content.len();
            docs.push(content);
        }
    }
    docs
}

/// Formats tool definitions for the prompt.
pub fn format_tool_descriptions(definitions: &[ToolDefinition]) -> String {
    if definitions.is_empty() {
        return String::new();
    }
    let mut parts = vec!["## Available Tools\n".to_string()];
    for def in definitions {
        parts.push(format!("### {}\n{}\n", def.name, def.description));
    }
    parts.join("\n")
}

/// Assembles the full system prompt, priority ascending.
pub async fn build_system_prompt(
    base_instructions: &str,
    env: &dyn ExecutionEnvironment,
    definitions: &[ToolDefinition],
    model: &str,
    provider_id: &str,
    user_instructions: Option<&str>,
) -> String {
    let git = get_git_context(env.working_directory()).await;

    let mut layers = Vec::new();
    if !base_instructions.is_empty() {
        layers.push(base_instructions.to_string());
    }
    layers.push(build_environment_context(env, model, &git));
    let tool_text = format_tool_descriptions(definitions);
    if !tool_text.is_empty() {
        layers.push(tool_text);
    }
    layers.extend(discover_project_docs(env.working_directory(), provider_id).await);
    if let Some(user) = user_instructions {
        if !user.is_empty() {
            layers.push(user.to_string());
        }
    }
    layers.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::LocalExecutionEnvironment;
    use serde_json::json;
    use std::path::Path;

    fn env_in(dir: &Path) -> LocalExecutionEnvironment {
        LocalExecutionEnvironment::with_working_dir(dir.display().to_string())
    }

    fn defs() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "shell".to_string(),
                description: "Run a command.".to_string(),
                parameters: json!({}),
            },
            ToolDefinition {
                name: "grep".to_string(),
                description: "Search files.".to_string(),
                parameters: json!({}),
            },
        ]
    }

    #[tokio::test]
    async fn non_repo_directory_reports_not_a_repo() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = get_git_context(&dir.path().display().to_string()).await;
        assert!(!ctx.is_repo);
    }

    #[tokio::test]
    async fn environment_block_includes_directory_and_date() {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = env_in(dir.path());
        let block = build_environment_context(&env, "test-model", &GitContext::default());
        assert!(block.starts_with("<environment>"));
        assert!(block.ends_with("</environment>"));
        assert!(block.contains("Working directory:"));
        assert!(block.contains("Is git repository: false"));
        assert!(block.contains("Today's date:"));
        assert!(block.contains("Model: test-model"));
    }

    #[test]
    fn tool_descriptions_render_headings() {
        let text = format_tool_descriptions(&defs());
        assert!(text.starts_with("## Available Tools"));
        assert!(text.contains("### shell"));
        assert!(text.contains("### grep"));
        assert_eq!(format_tool_descriptions(&[]), "");
    }

    #[tokio::test]
    async fn project_docs_loaded_from_working_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("AGENTS.md"), "project rules").expect("write");
        let docs =
            discover_project_docs(&dir.path().display().to_string(), "anthropic").await;
        assert_eq!(docs, vec!["project rules".to_string()]);
    }

    #[tokio::test]
    async fn provider_specific_docs_follow_generic() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("AGENTS.md"), "generic").expect("write");
        std::fs::write(dir.path().join("CLAUDE.md"), "specific").expect("write");
        let docs =
            discover_project_docs(&dir.path().display().to_string(), "anthropic").await;
        assert_eq!(docs, vec!["generic".to_string(), "specific".to_string()]);
        // Another provider ignores the foreign companion file.
        let docs = discover_project_docs(&dir.path().display().to_string(), "gemini").await;
        assert_eq!(docs, vec!["generic".to_string()]);
    }

    #[tokio::test]
    async fn docs_truncated_at_budget_with_marker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let huge = "x".repeat(PROMPT_BUDGET_BYTES + 500);
        std::fs::write(dir.path().join("AGENTS.md"), &huge).expect("write");
        let docs =
            discover_project_docs(&dir.path().display().to_string(), "anthropic").await;
        assert_eq!(docs.len(), 1);
        assert!(docs[0].ends_with("[Project instructions truncated at 32KB]"));
        assert!(docs[0].len() < huge.len());
    }

    #[tokio::test]
    async fn layers_assemble_in_priority_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("AGENTS.md"), "PROJECT-DOC").expect("write");
        let env = env_in(dir.path());
        let prompt = build_system_prompt(
            "BASE",
            &env,
            &defs(),
            "m1",
            "anthropic",
            Some("USER-OVERRIDE"),
        )
        .await;
        let base_pos = prompt.find("BASE").expect("base");
        let env_pos = prompt.find("<environment>").expect("env");
        let tools_pos = prompt.find("## Available Tools").expect("tools");
        let doc_pos = prompt.find("PROJECT-DOC").expect("doc");
        let user_pos = prompt.find("USER-OVERRIDE").expect("user");
        assert!(base_pos < env_pos && env_pos < tools_pos && tools_pos < doc_pos && doc_pos < user_pos);
    }
}
