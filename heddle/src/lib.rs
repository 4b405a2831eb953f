//! # Heddle
//!
//! A pipeline execution engine for LLM-driven agent workflows. A directed
//! attribute graph (authored in a DOT-style textual format) describes the
//! pipeline; each node names an operation and each edge may carry a guard
//! condition and a display label. The engine traverses the graph, executes
//! nodes through a pluggable [`HandlerRegistry`], routes between nodes with
//! a deterministic 5-priority edge-selection procedure, persists a
//! [`Checkpoint`] after every stage, and emits [`PipelineEvent`]s throughout.
//!
//! ## Main modules
//!
//! - [`graph`]: [`Graph`], [`Node`], [`Edge`]; [`graph::parse::parse_graph`]
//!   and [`graph::validate::validate`].
//! - [`engine`]: [`Engine`] with the run loop, retry executor, and goal gates.
//! - [`edge_selector`]: [`select_edge`], deterministic routing.
//! - [`conditions`]: [`evaluate_condition`] for `k=v && k!=v` guards.
//! - [`handler`] / [`handlers`]: the [`Handler`] trait, registry, and the
//!   built-in start/exit/conditional/wait.human handlers.
//! - [`context`]: [`Context`], the per-run key/value store.
//! - [`events`]: [`EventBus`], synchronous typed fan-out.
//! - [`checkpoint`]: [`Checkpoint`] save/restore.
//! - [`interviewer`]: human-in-the-loop questions for wait.human nodes.
//! - [`artifact`]: [`ArtifactStore`], a spill-to-disk payload store.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use heddle::{Engine, HandlerRegistry};
//! use heddle::graph::parse::parse_graph;
//! use heddle::handlers::register_builtin_handlers;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = parse_graph(r#"
//!     digraph hello {
//!         goal="say hello";
//!         start [shape=Mdiamond];
//!         done [shape=Msquare];
//!         start -> done;
//!     }
//! "#)?;
//!
//! let mut registry = HandlerRegistry::new();
//! register_builtin_handlers(&mut registry, None);
//!
//! let mut engine = Engine::new(graph, registry);
//! let outcome = engine.run().await?;
//! println!("{}", outcome.status);
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod checkpoint;
pub mod conditions;
pub mod context;
pub mod edge_selector;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod handler;
pub mod handlers;
pub mod interviewer;
pub mod outcome;
pub mod retry;

pub use artifact::{ArtifactInfo, ArtifactStore};
pub use checkpoint::{Checkpoint, CheckpointError};
pub use conditions::{evaluate_condition, parse_condition, resolve_key};
pub use context::Context;
pub use edge_selector::select_edge;
pub use engine::Engine;
pub use error::{EngineError, HandlerError};
pub use events::{EventBus, EventKind, PipelineEvent};
pub use graph::{Edge, Graph, Node};
pub use handler::{Handler, HandlerRegistry};
pub use interviewer::{Answer, ConsoleInterviewer, Interviewer, Question, ScriptedInterviewer};
pub use outcome::{Outcome, Status};
pub use retry::{build_retry_policy, BackoffConfig, RetryPolicy};
