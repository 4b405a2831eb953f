//! Artifact store: in-memory with automatic file-backing for large payloads.
//!
//! Handlers exchange serialized artifacts by id. Payloads over the spill
//! threshold are written to a temp directory on disk and loaded on demand so
//! big outputs never pin memory for the run's lifetime.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

/// Payloads larger than this many serialized bytes are spilled to disk.
const SPILL_THRESHOLD: usize = 100 * 1024;

/// Metadata about a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub artifact_id: String,
    pub name: String,
    pub size_bytes: usize,
    pub spilled: bool,
}

/// Artifact store failure.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact io: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact serialization: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unknown artifact `{0}`")]
    Unknown(String),
}

#[derive(Default)]
struct Inner {
    spill_dir: Option<tempfile::TempDir>,
    memory: HashMap<String, Value>,
    info: HashMap<String, ArtifactInfo>,
}

impl Inner {
    fn spill_path(&mut self, artifact_id: &str) -> Result<PathBuf, ArtifactError> {
        if self.spill_dir.is_none() {
            self.spill_dir = Some(tempfile::TempDir::with_prefix("heddle-artifacts-")?);
        }
        // spill_dir was just populated above.
        let dir = self.spill_dir.as_ref().map(|d| d.path().to_path_buf());
        match dir {
            Some(d) => Ok(d.join(format!("{}.json", artifact_id))),
            None => Err(ArtifactError::Unknown(artifact_id.to_string())),
        }
    }
}

/// Mutex-guarded artifact storage shared across handlers.
#[derive(Default)]
pub struct ArtifactStore {
    inner: Mutex<Inner>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an artifact, spilling to disk past the threshold.
    pub fn store(
        &self,
        artifact_id: impl Into<String>,
        name: impl Into<String>,
        data: Value,
    ) -> Result<ArtifactInfo, ArtifactError> {
        let artifact_id = artifact_id.into();
        let serialized = serde_json::to_vec(&data)?;
        let size = serialized.len();
        let spilled = size > SPILL_THRESHOLD;

        let mut inner = self.inner.lock();
        if spilled {
            let path = inner.spill_path(&artifact_id)?;
            std::fs::write(&path, &serialized)?;
            inner.memory.remove(&artifact_id);
        } else {
            // Replacing a previously spilled artifact leaves its file to the
            // temp dir cleanup; the info record is authoritative.
            inner.memory.insert(artifact_id.clone(), data);
        }
        let info = ArtifactInfo {
            artifact_id: artifact_id.clone(),
            name: name.into(),
            size_bytes: size,
            spilled,
        };
        inner.info.insert(artifact_id, info.clone());
        Ok(info)
    }

    /// Loads an artifact by id, reading back from disk when spilled.
    pub fn load(&self, artifact_id: &str) -> Result<Value, ArtifactError> {
        let mut inner = self.inner.lock();
        if let Some(v) = inner.memory.get(artifact_id) {
            return Ok(v.clone());
        }
        let info = inner
            .info
            .get(artifact_id)
            .cloned()
            .ok_or_else(|| ArtifactError::Unknown(artifact_id.to_string()))?;
        if !info.spilled {
            return Err(ArtifactError::Unknown(artifact_id.to_string()));
        }
        let path = inner.spill_path(artifact_id)?;
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Metadata for one artifact.
    pub fn info(&self, artifact_id: &str) -> Option<ArtifactInfo> {
        self.inner.lock().info.get(artifact_id).cloned()
    }

    /// Metadata for all stored artifacts.
    pub fn list(&self) -> Vec<ArtifactInfo> {
        let mut all: Vec<ArtifactInfo> = self.inner.lock().info.values().cloned().collect();
        all.sort_by(|a, b| a.artifact_id.cmp(&b.artifact_id));
        all
    }

    /// Removes an artifact; unknown ids are a no-op.
    pub fn remove(&self, artifact_id: &str) -> Result<(), ArtifactError> {
        let mut inner = self.inner.lock();
        inner.memory.remove(artifact_id);
        if let Some(info) = inner.info.remove(artifact_id) {
            if info.spilled {
                let path = inner.spill_path(artifact_id)?;
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
            }
        }
        Ok(())
    }
}
