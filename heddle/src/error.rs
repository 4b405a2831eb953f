//! Engine error types.
//!
//! Handler failures are retried and mapped to FAIL outcomes inside the
//! engine; [`EngineError`] covers only programming and environment errors
//! that abort the run itself.

use thiserror::Error;

use crate::checkpoint::CheckpointError;

/// Error aborting a pipeline run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The graph has no node with the start shape.
    #[error("no start node found in graph")]
    NoStartNode,

    /// An edge or retry target names a node that does not exist.
    #[error("unknown node `{0}`")]
    UnknownNode(String),

    /// No handler resolves for a node's type or shape and no default is set.
    #[error("no handler for node `{node_id}` (type=`{node_type}`, shape=`{shape}`)")]
    MissingHandler {
        node_id: String,
        node_type: String,
        shape: String,
    },

    #[error("engine io: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine serialization: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Error returned by a node handler.
///
/// The retry executor treats any handler error as a failed attempt; the
/// final attempt's error text becomes the FAIL outcome's failure reason.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("handler io: {0}")]
    Io(#[from] std::io::Error),

    #[error("handler serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

impl HandlerError {
    /// Shorthand for a free-form failure.
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}
