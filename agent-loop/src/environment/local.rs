//! Local execution environment: tools run on this machine.
//!
//! File operations use std paths resolved against the working directory.
//! Commands run through `sh -c` in their own process group so a timeout can
//! terminate the whole tree (SIGTERM, 2 s grace, SIGKILL) while keeping the
//! partial output. Grep prefers an external `rg` when one is on PATH and
//! falls back to an in-process regex walk.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use super::{DirEntry, EnvError, ExecResult, ExecutionEnvironment, GrepOptions};

/// Variable-name patterns never passed to child processes under
/// `InheritCore`.
const SENSITIVE_SUFFIXES: &[&str] = &["_API_KEY", "_SECRET", "_TOKEN", "_PASSWORD", "_CREDENTIAL"];

/// Small allow-list that survives `InheritNone`.
const ALWAYS_INCLUDE: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "SHELL",
    "LANG",
    "TERM",
    "TMPDIR",
    "GOPATH",
    "CARGO_HOME",
    "NVM_DIR",
    "PYTHONPATH",
    "VIRTUAL_ENV",
    "PYENV_ROOT",
    "RBENV_ROOT",
    "RUSTUP_HOME",
];

/// How child processes inherit the parent environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvVarPolicy {
    /// Drop credential-shaped variables, keep the rest.
    #[default]
    InheritCore,
    /// Pass everything through.
    InheritAll,
    /// Only the core allow-list.
    InheritNone,
}

fn is_sensitive(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    SENSITIVE_SUFFIXES.iter().any(|suffix| upper.ends_with(suffix))
}

/// Applies the policy to the current process environment.
pub(crate) fn filter_env(policy: EnvVarPolicy) -> Vec<(String, String)> {
    std::env::vars()
        .filter(|(name, _)| match policy {
            EnvVarPolicy::InheritAll => true,
            EnvVarPolicy::InheritNone => ALWAYS_INCLUDE.contains(&name.as_str()),
            EnvVarPolicy::InheritCore => !is_sensitive(name),
        })
        .collect()
}

/// Tools run on the local machine.
pub struct LocalExecutionEnvironment {
    working_dir: String,
    env_policy: EnvVarPolicy,
}

impl LocalExecutionEnvironment {
    /// Environment rooted at the current directory with the default policy.
    pub fn new() -> Self {
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| ".".to_string());
        Self {
            working_dir: cwd,
            env_policy: EnvVarPolicy::InheritCore,
        }
    }

    /// Environment rooted at `working_dir`.
    pub fn with_working_dir(working_dir: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            env_policy: EnvVarPolicy::InheritCore,
        }
    }

    /// Overrides the env-var inheritance policy (builder).
    pub fn with_env_policy(mut self, policy: EnvVarPolicy) -> Self {
        self.env_policy = policy;
        self
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            Path::new(&self.working_dir).join(p)
        }
    }

    async fn grep_external(
        &self,
        rg: &Path,
        pattern: &str,
        path: &Path,
        options: &GrepOptions,
    ) -> Result<String, EnvError> {
        let mut cmd = tokio::process::Command::new(rg);
        cmd.arg("--no-heading").arg("--line-number");
        if options.case_insensitive {
            cmd.arg("-i");
        }
        if let Some(filter) = &options.glob_filter {
            cmd.arg("--glob").arg(filter);
        }
        if options.max_results > 0 {
            cmd.arg("-m").arg(options.max_results.to_string());
        }
        cmd.arg(pattern).arg(path);
        let output = tokio::time::timeout(Duration::from_secs(30), cmd.output())
            .await
            .map_err(|_| EnvError::Failed("rg timed out".to_string()))??;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn grep_walk(
        pattern: &str,
        path: &Path,
        options: &GrepOptions,
    ) -> Result<String, EnvError> {
        let regex = regex::RegexBuilder::new(pattern)
            .case_insensitive(options.case_insensitive)
            .build()
            .map_err(|e| EnvError::Failed(format!("invalid regex: {}", e)))?;
        let name_filter = options
            .glob_filter
            .as_deref()
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|e| EnvError::Failed(format!("invalid glob filter: {}", e)))?;
        let max = if options.max_results > 0 {
            options.max_results
        } else {
            usize::MAX
        };

        let mut results = Vec::new();
        let files: Vec<PathBuf> = if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            walkdir::WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect()
        };

        'outer: for file in files {
            if let Some(filter) = &name_filter {
                let name = file.file_name().map(|n| n.to_string_lossy().into_owned());
                if !name.map(|n| filter.matches(&n)).unwrap_or(false) {
                    continue;
                }
            }
            let Ok(bytes) = std::fs::read(&file) else {
                continue;
            };
            let text = String::from_utf8_lossy(&bytes);
            for (i, line) in text.lines().enumerate() {
                if regex.is_match(line) {
                    results.push(format!("{}:{}:{}", file.display(), i + 1, line));
                    if results.len() >= max {
                        break 'outer;
                    }
                }
            }
        }
        Ok(results.join("\n"))
    }
}

impl Default for LocalExecutionEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionEnvironment for LocalExecutionEnvironment {
    async fn read_file(
        &self,
        path: &str,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<String, EnvError> {
        let resolved = self.resolve(path);
        let bytes = tokio::fs::read(&resolved).await?;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        if offset.is_none() && limit.is_none() {
            return Ok(content);
        }
        let start = offset.map(|o| o.saturating_sub(1)).unwrap_or(0);
        let lines: Vec<&str> = content.lines().collect();
        let end = limit
            .map(|l| (start + l).min(lines.len()))
            .unwrap_or(lines.len());
        if start >= lines.len() {
            return Ok(String::new());
        }
        Ok(lines[start..end].join("\n"))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), EnvError> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&resolved, content).await?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), EnvError> {
        let resolved = self.resolve(path);
        if resolved.exists() {
            tokio::fs::remove_file(&resolved).await?;
        }
        Ok(())
    }

    async fn file_exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, EnvError> {
        let resolved = self.resolve(path);
        if !resolved.is_dir() {
            return Err(EnvError::Failed(format!("not a directory: {}", path)));
        }
        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&resolved).await?;
        while let Some(entry) = reader.next_entry().await? {
            let meta = entry.metadata().await?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                size: meta.is_file().then(|| meta.len()),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn exec_command(&self, command: &str, timeout_ms: u64) -> Result<ExecResult, EnvError> {
        let start = Instant::now();

        #[cfg(unix)]
        let mut cmd = {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c").arg(command);
            // Own process group, so the whole tree dies on timeout.
            cmd.process_group(0);
            cmd
        };
        #[cfg(not(unix))]
        let mut cmd = {
            let mut cmd = tokio::process::Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        };

        cmd.current_dir(&self.working_dir)
            .env_clear()
            .envs(filter_env(self.env_policy))
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .stdin(std::process::Stdio::null());

        let mut child = cmd.spawn()?;
        let pid = child.id();

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let timeout = Duration::from_millis(timeout_ms);
        let (timed_out, exit_code) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => {
                let status = status?;
                (false, status.code().unwrap_or(-1))
            }
            Err(_) => {
                #[cfg(unix)]
                if let Some(pid) = pid {
                    // SIGTERM the group, give it two seconds, then SIGKILL.
                    unsafe {
                        libc::kill(-(pid as i32), libc::SIGTERM);
                    }
                    if tokio::time::timeout(Duration::from_secs(2), child.wait())
                        .await
                        .is_err()
                    {
                        unsafe {
                            libc::kill(-(pid as i32), libc::SIGKILL);
                        }
                        let _ = child.wait().await;
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = pid;
                    let _ = child.kill().await;
                }
                (true, -1)
            }
        };

        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let stderr_bytes = stderr_task.await.unwrap_or_default();
        let mut stdout = String::from_utf8_lossy(&stdout_bytes).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();

        if timed_out {
            stdout.push_str(&format!(
                "\n[ERROR: Command timed out after {}ms. Partial output is shown above.\n\
                 You can retry with a longer timeout by setting the timeout_ms parameter.]",
                timeout_ms
            ));
        }

        Ok(ExecResult {
            stdout,
            stderr,
            exit_code,
            timed_out,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn grep(
        &self,
        pattern: &str,
        path: &str,
        options: &GrepOptions,
    ) -> Result<String, EnvError> {
        let resolved = self.resolve(path);
        if let Ok(rg) = which::which("rg") {
            match self.grep_external(&rg, pattern, &resolved, options).await {
                Ok(out) => return Ok(out),
                Err(e) => {
                    tracing::debug!(error = %e, "rg failed; falling back to in-process grep");
                }
            }
        }
        let pattern = pattern.to_string();
        let options = options.clone();
        tokio::task::spawn_blocking(move || Self::grep_walk(&pattern, &resolved, &options))
            .await
            .map_err(|e| EnvError::Failed(e.to_string()))?
    }

    async fn glob(&self, pattern: &str, path: &str) -> Result<Vec<String>, EnvError> {
        let base = self.resolve(path);
        let matcher = glob::Pattern::new(pattern)
            .map_err(|e| EnvError::Failed(format!("invalid glob: {}", e)))?;

        let matches = tokio::task::spawn_blocking(move || {
            let mut found: Vec<(PathBuf, SystemTime)> = walkdir::WalkDir::new(&base)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| {
                    e.path()
                        .strip_prefix(&base)
                        .map(|rel| matcher.matches_path(rel))
                        .unwrap_or(false)
                })
                .map(|e| {
                    let mtime = e
                        .metadata()
                        .ok()
                        .and_then(|m| m.modified().ok())
                        .unwrap_or(SystemTime::UNIX_EPOCH);
                    (e.into_path(), mtime)
                })
                .collect();
            // Newest first.
            found.sort_by(|a, b| b.1.cmp(&a.1));
            found
                .into_iter()
                .map(|(p, _)| p.display().to_string())
                .collect::<Vec<String>>()
        })
        .await
        .map_err(|e| EnvError::Failed(e.to_string()))?;

        Ok(matches)
    }

    fn working_directory(&self) -> &str {
        &self.working_dir
    }

    fn platform(&self) -> String {
        std::env::consts::OS.to_string()
    }

    fn os_version(&self) -> String {
        format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
    }
}
