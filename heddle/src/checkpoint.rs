//! Engine checkpoints: point-in-time snapshots written after every stage.
//!
//! The serialized document carries a schema version, the last completed node
//! (as "current"), the ordered completed list, per-node retry counts, a full
//! context snapshot, and an ISO-8601 UTC timestamp. Saves are atomic with
//! respect to readers: the file is written to a temp name in the same
//! directory and renamed over the target.

use std::collections::HashMap;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Current checkpoint schema version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Failure while saving or loading a checkpoint.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint io: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint format: {0}")]
    Format(#[from] serde_json::Error),
}

/// Snapshot of engine state suitable for restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Schema version; readers reject documents they do not understand.
    pub version: u32,
    /// Last completed node id.
    pub current_node: String,
    /// Completed node ids, in completion order.
    pub completed_nodes: Vec<String>,
    /// Retry counts for nodes that retried.
    pub node_retries: HashMap<String, u32>,
    /// Full context snapshot at save time.
    pub context_values: HashMap<String, Value>,
    /// ISO-8601 UTC save time.
    pub timestamp: String,
}

impl Checkpoint {
    /// Builds a checkpoint stamped with the current time.
    pub fn create_now(
        current_node: impl Into<String>,
        completed_nodes: Vec<String>,
        node_retries: HashMap<String, u32>,
        context_values: HashMap<String, Value>,
    ) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            current_node: current_node.into(),
            completed_nodes,
            node_retries,
            context_values,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Writes the checkpoint atomically: temp file in the same directory,
    /// then rename over `path`.
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let data = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Loads a checkpoint from `path`.
    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}
