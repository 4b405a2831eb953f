//! Node handlers and the handler registry.
//!
//! A handler executes one node and returns an [`Outcome`]. Resolution maps a
//! node to a handler by explicit type first, then by shape through a fixed
//! shape→type table, then the registry default.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{EngineError, HandlerError};
use crate::graph::{Graph, Node};
use crate::outcome::Outcome;

/// Executes one node of the pipeline.
///
/// Handlers may read the context and the graph but must not mutate either;
/// changes are published through `Outcome::context_updates` and applied by
/// the engine. `stage_dir` is the node's log directory, pre-created by the
/// engine; handlers may write artifacts there.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn execute(
        &self,
        node: &Node,
        ctx: &Context,
        graph: &Graph,
        stage_dir: &Path,
    ) -> Result<Outcome, HandlerError>;
}

/// Fixed shape→type table used when a node has no explicit type.
pub fn shape_to_type(shape: &str) -> Option<&'static str> {
    match shape {
        "Mdiamond" => Some("start"),
        "Msquare" => Some("exit"),
        "box" => Some("codergen"),
        "hexagon" => Some("wait.human"),
        "diamond" => Some("conditional"),
        "component" => Some("parallel"),
        "tripleoctagon" => Some("parallel.fan_in"),
        "parallelogram" => Some("tool"),
        "house" => Some("stack.manager_loop"),
        _ => None,
    }
}

/// Maps node types (and, through shapes, nodes) to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
    default: Option<Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a named type, replacing any previous one.
    pub fn register(&mut self, type_name: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.insert(type_name.into(), handler);
    }

    /// Sets the fallback handler used when no specific match is found.
    pub fn set_default(&mut self, handler: Arc<dyn Handler>) {
        self.default = Some(handler);
    }

    /// Resolves the handler for a node.
    ///
    /// Order: explicit `node_type`, shape table, default. A miss is a
    /// programming error and is not retried by the engine.
    pub fn resolve(&self, node: &Node) -> Result<Arc<dyn Handler>, EngineError> {
        if !node.node_type.is_empty() {
            if let Some(h) = self.handlers.get(&node.node_type) {
                return Ok(h.clone());
            }
        }
        if let Some(type_name) = shape_to_type(&node.shape) {
            if let Some(h) = self.handlers.get(type_name) {
                return Ok(h.clone());
            }
        }
        if let Some(h) = &self.default {
            return Ok(h.clone());
        }
        Err(EngineError::MissingHandler {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            shape: node.shape.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Status;

    struct TagHandler(&'static str);

    #[async_trait]
    impl Handler for TagHandler {
        async fn execute(
            &self,
            _node: &Node,
            _ctx: &Context,
            _graph: &Graph,
            _stage_dir: &Path,
        ) -> Result<Outcome, HandlerError> {
            Ok(Outcome::success().with_notes(self.0))
        }
    }

    fn node_with(shape: &str, node_type: &str) -> Node {
        let mut n = Node::new("n");
        n.shape = shape.to_string();
        n.node_type = node_type.to_string();
        n
    }

    #[tokio::test]
    async fn explicit_type_wins_over_shape() {
        let mut reg = HandlerRegistry::new();
        reg.register("custom", Arc::new(TagHandler("custom")));
        reg.register("codergen", Arc::new(TagHandler("codergen")));

        let node = node_with("box", "custom");
        let h = reg.resolve(&node).expect("resolve");
        let out = h
            .execute(&node, &Context::new(), &Graph::new("g"), Path::new("/tmp"))
            .await
            .expect("execute");
        assert_eq!(out.status, Status::Success);
        assert_eq!(out.notes, "custom");
    }

    #[tokio::test]
    async fn shape_resolution_through_table() {
        let mut reg = HandlerRegistry::new();
        reg.register("codergen", Arc::new(TagHandler("codergen")));
        let node = node_with("box", "");
        let h = reg.resolve(&node).expect("resolve");
        let out = h
            .execute(&node, &Context::new(), &Graph::new("g"), Path::new("/tmp"))
            .await
            .expect("execute");
        assert_eq!(out.notes, "codergen");
    }

    #[test]
    fn default_handler_is_last_resort() {
        let mut reg = HandlerRegistry::new();
        reg.set_default(Arc::new(TagHandler("default")));
        assert!(reg.resolve(&node_with("unknown_shape", "")).is_ok());
    }

    #[test]
    fn missing_handler_is_error() {
        let reg = HandlerRegistry::new();
        let err = match reg.resolve(&node_with("box", "")) {
            Err(err) => err,
            Ok(_) => panic!("no handler"),
        };
        assert!(matches!(err, EngineError::MissingHandler { .. }));
    }

    #[test]
    fn shape_table_covers_spec_shapes() {
        assert_eq!(shape_to_type("Mdiamond"), Some("start"));
        assert_eq!(shape_to_type("Msquare"), Some("exit"));
        assert_eq!(shape_to_type("box"), Some("codergen"));
        assert_eq!(shape_to_type("diamond"), Some("conditional"));
        assert_eq!(shape_to_type("hexagon"), Some("wait.human"));
        assert_eq!(shape_to_type("oval"), None);
    }
}
