//! Execution environments: where tools actually run.
//!
//! Every core tool is implemented over the [`ExecutionEnvironment`] trait so
//! sessions can target the local machine today and something else later
//! without touching tool code.

pub mod local;

use async_trait::async_trait;
use thiserror::Error;

pub use local::{EnvVarPolicy, LocalExecutionEnvironment};

/// Failure inside an environment operation.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("{0}")]
    Failed(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// One directory listing entry.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: Option<u64>,
}

/// Result of a shell command.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_ms: u64,
}

/// Options for the grep operation.
#[derive(Debug, Clone, Default)]
pub struct GrepOptions {
    pub case_insensitive: bool,
    /// File-name filter, e.g. `*.rs`.
    pub glob_filter: Option<String>,
    /// Stop after this many matching lines.
    pub max_results: usize,
}

impl GrepOptions {
    pub fn with_max_results(max_results: usize) -> Self {
        Self {
            max_results,
            ..Default::default()
        }
    }
}

/// The surface tools run against.
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    /// Reads a file as UTF-8 (lossy). `offset` is a 1-based line number;
    /// `limit` caps the number of lines returned.
    async fn read_file(
        &self,
        path: &str,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<String, EnvError>;

    /// Writes a file, creating parent directories as needed.
    async fn write_file(&self, path: &str, content: &str) -> Result<(), EnvError>;

    /// Removes a file; missing files are a no-op.
    async fn delete_file(&self, path: &str) -> Result<(), EnvError>;

    async fn file_exists(&self, path: &str) -> bool;

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, EnvError>;

    /// Runs a shell command with a timeout. On timeout the process group is
    /// terminated (SIGTERM, 2 s grace, SIGKILL) and partial output is
    /// preserved with a timeout marker appended.
    async fn exec_command(&self, command: &str, timeout_ms: u64) -> Result<ExecResult, EnvError>;

    /// Regex search over files; returns `path:line:text` rows.
    async fn grep(
        &self,
        pattern: &str,
        path: &str,
        options: &GrepOptions,
    ) -> Result<String, EnvError>;

    /// Glob match under `path`; files only, newest (mtime) first.
    async fn glob(&self, pattern: &str, path: &str) -> Result<Vec<String>, EnvError>;

    fn working_directory(&self) -> &str;

    fn platform(&self) -> String;

    fn os_version(&self) -> String;
}
