//! Pipeline graph model: immutable nodes, edges, and adjacency queries.
//!
//! A [`Graph`] is produced by the parser ([`parse::parse_graph`]) and never
//! mutated afterwards; all per-run state lives in
//! [`Context`](crate::context::Context). Node shape and type jointly select
//! the handler (see [`HandlerRegistry`](crate::handler::HandlerRegistry)).

pub mod parse;
pub mod validate;

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

/// Shape marking the unique start node.
pub const SHAPE_START: &str = "Mdiamond";
/// Shape marking exit (terminal) nodes.
pub const SHAPE_EXIT: &str = "Msquare";

/// One node of the pipeline graph.
///
/// Behavior fields are parsed out of the attribute list; anything the parser
/// does not recognize stays in `attributes` for handler-specific use.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Unique id within the graph.
    pub id: String,
    /// Human-facing label (defaults to the id).
    pub label: String,
    /// Shape name, e.g. `Mdiamond`, `Msquare`, `box`, `diamond`, `hexagon`.
    pub shape: String,
    /// Explicit handler type; overrides shape-based resolution when set.
    pub node_type: String,
    /// Task prompt for LLM-backed handlers.
    pub prompt: String,
    /// Extra retry attempts beyond the first (policy max = retries + 1).
    pub max_retries: u32,
    /// Per-node execution timeout.
    pub timeout: Option<Duration>,
    /// Whether this node's success is required before any exit is accepted.
    pub goal_gate: bool,
    /// Node to route to when this goal gate fails.
    pub retry_target: Option<String>,
    /// Secondary retry target consulted after `retry_target`.
    pub fallback_retry_target: Option<String>,
    /// Accept PARTIAL_SUCCESS when retries are exhausted.
    pub allow_partial: bool,
    /// Stylesheet class for downstream presentation.
    pub node_class: String,
    /// Model override for LLM-backed handlers.
    pub llm_model: Option<String>,
    /// Provider override for LLM-backed handlers.
    pub llm_provider: Option<String>,
    /// Reasoning-effort override for LLM-backed handlers.
    pub reasoning_effort: Option<String>,
    /// Unrecognized attributes, kept verbatim.
    pub attributes: HashMap<String, String>,
}

impl Node {
    /// Creates a node with the given id; the label defaults to the id.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            ..Default::default()
        }
    }

    /// Whether this node carries the start shape.
    pub fn is_start(&self) -> bool {
        self.shape == SHAPE_START
    }

    /// Whether this node carries the exit shape.
    pub fn is_exit(&self) -> bool {
        self.shape == SHAPE_EXIT
    }
}

/// One directed edge of the pipeline graph.
#[derive(Debug, Clone, Default)]
pub struct Edge {
    pub from_node: String,
    pub to_node: String,
    /// Human-facing label, e.g. `[Y] Yes`; matched against preferred labels.
    pub label: String,
    /// Guard expression (`k=v && k!=v`); empty means unconditional.
    pub condition: String,
    /// Tiebreak weight; higher wins.
    pub weight: i64,
    /// Marks a back-edge that restarts a loop body.
    pub loop_restart: bool,
    /// Fidelity hint for downstream summarization.
    pub fidelity: Option<String>,
    /// Thread id for fan-in/fan-out bookkeeping.
    pub thread_id: Option<String>,
    /// Unrecognized attributes, kept verbatim.
    pub attributes: HashMap<String, String>,
}

impl Edge {
    /// Creates an unconditional, unlabeled edge.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from_node: from.into(),
            to_node: to.into(),
            ..Default::default()
        }
    }
}

/// Immutable pipeline graph: named nodes plus an ordered edge list.
///
/// Edge order is the declaration order in the source text; the edge selector
/// and the checkpoint-resume rule both depend on it.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub name: String,
    /// Graph-level attributes (`goal`, `default_max_retry`, `retry_target`, ...).
    pub attributes: HashMap<String, String>,
    pub nodes: HashMap<String, Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    /// Creates an empty graph with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The graph goal, from the `goal` attribute (empty when unset).
    pub fn goal(&self) -> &str {
        self.attributes.get("goal").map(String::as_str).unwrap_or("")
    }

    /// Returns the node with the given id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// The unique node carrying the start shape, if any.
    pub fn start_node(&self) -> Option<&Node> {
        self.nodes.values().find(|n| n.is_start())
    }

    /// All nodes carrying the exit shape.
    pub fn exit_nodes(&self) -> Vec<&Node> {
        self.nodes.values().filter(|n| n.is_exit()).collect()
    }

    /// Outgoing edges of `id`, in declaration order.
    pub fn outgoing(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.from_node == id).collect()
    }

    /// Incoming edges of `id`, in declaration order.
    pub fn incoming(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.to_node == id).collect()
    }

    /// Ids of all nodes reachable from `id` (including `id` itself).
    pub fn reachable_from(&self, id: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        if !self.nodes.contains_key(id) {
            return seen;
        }
        let mut queue = VecDeque::new();
        seen.insert(id.to_string());
        queue.push_back(id.to_string());
        while let Some(current) = queue.pop_front() {
            for edge in self.edges.iter().filter(|e| e.from_node == current) {
                if seen.insert(edge.to_node.clone()) {
                    queue.push_back(edge.to_node.clone());
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond_graph() -> Graph {
        let mut g = Graph::new("diamond");
        for (id, shape) in [
            ("start", SHAPE_START),
            ("a", "box"),
            ("b", "box"),
            ("exit", SHAPE_EXIT),
        ] {
            let mut n = Node::new(id);
            n.shape = shape.to_string();
            g.nodes.insert(id.to_string(), n);
        }
        g.edges.push(Edge::new("start", "a"));
        g.edges.push(Edge::new("start", "b"));
        g.edges.push(Edge::new("a", "exit"));
        g.edges.push(Edge::new("b", "exit"));
        g
    }

    #[test]
    fn start_and_exit_lookup() {
        let g = diamond_graph();
        assert_eq!(g.start_node().map(|n| n.id.as_str()), Some("start"));
        assert_eq!(g.exit_nodes().len(), 1);
    }

    #[test]
    fn outgoing_preserves_declaration_order() {
        let g = diamond_graph();
        let out: Vec<&str> = g.outgoing("start").iter().map(|e| e.to_node.as_str()).collect();
        assert_eq!(out, vec!["a", "b"]);
        assert_eq!(g.incoming("exit").len(), 2);
    }

    #[test]
    fn reachable_from_start_covers_all() {
        let g = diamond_graph();
        let reach = g.reachable_from("start");
        assert_eq!(reach.len(), 4);
        assert!(reach.contains("exit"));
    }

    #[test]
    fn reachable_from_unknown_is_empty() {
        let g = diamond_graph();
        assert!(g.reachable_from("nope").is_empty());
    }
}
