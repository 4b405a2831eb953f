//! CLI for Heddle: run, check, and render pipeline graphs.
//!
//! `run` parses and validates a graph file, wires the built-in handlers plus
//! the codergen agent loop, subscribes a progress listener to the event bus,
//! and executes the engine. Exit status: 0 for SUCCESS or PARTIAL_SUCCESS,
//! 1 otherwise.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use thiserror::Error;

use agent_loop::{CodergenHandler, LocalExecutionEnvironment, ProviderProfile, ToolHandler};
use heddle::graph::parse::parse_graph;
use heddle::graph::validate::{is_valid, validate};
use heddle::handlers::register_builtin_handlers;
use heddle::{
    Checkpoint, ConsoleInterviewer, Context, Engine, EventBus, Graph, HandlerRegistry,
    PipelineEvent, Status,
};
use llm::{LlmClient, MockClient, OpenAiCompatClient};

/// Base instructions given to codergen sessions.
const CODERGEN_BASE_INSTRUCTIONS: &str = "You are a capable software engineering agent. \
Work through the given task using the available tools. When the task is complete, \
reply with a concise summary of what you did.";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] heddle::graph::parse::ParseError),
    #[error("graph failed validation")]
    Invalid,
    #[error(transparent)]
    Engine(#[from] heddle::EngineError),
    #[error(transparent)]
    Checkpoint(#[from] heddle::CheckpointError),
    #[error("invalid seed `{0}`; expected key=value")]
    Seed(String),
    #[error(transparent)]
    Llm(#[from] llm::LlmError),
}

#[derive(Parser)]
#[command(name = "heddle", about = "Pipeline execution engine for agent workflows")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute a pipeline graph to completion.
    Run {
        /// Graph source file.
        graph: PathBuf,
        /// Directory for the manifest, checkpoint, and stage artifacts.
        #[arg(long)]
        logs_root: Option<PathBuf>,
        /// Resume from a previously written checkpoint file.
        #[arg(long)]
        resume: Option<PathBuf>,
        /// Seed context values, `key=value`; repeatable.
        #[arg(long = "seed")]
        seeds: Vec<String>,
        /// Model for codergen nodes (overridden per node by `llm_model`).
        #[arg(long, env = "HEDDLE_MODEL", default_value = "gpt-4o")]
        model: String,
        /// Suppress per-stage progress output.
        #[arg(long)]
        quiet: bool,
    },
    /// Parse and validate a graph, printing any violations.
    Check { graph: PathBuf },
    /// Print a text summary of the graph's nodes and edges.
    Render { graph: PathBuf },
}

fn load_graph(path: &PathBuf) -> Result<Graph, CliError> {
    let source = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse_graph(&source)?)
}

fn check_graph(graph: &Graph) -> Result<(), CliError> {
    let violations = validate(graph);
    for violation in &violations {
        eprintln!("{}", violation);
    }
    if is_valid(&violations) {
        Ok(())
    } else {
        Err(CliError::Invalid)
    }
}

fn parse_seeds(seeds: &[String]) -> Result<HashMap<String, serde_json::Value>, CliError> {
    let mut values = HashMap::new();
    for seed in seeds {
        let (key, value) = seed
            .split_once('=')
            .ok_or_else(|| CliError::Seed(seed.clone()))?;
        values.insert(key.to_string(), serde_json::Value::from(value));
    }
    Ok(values)
}

/// Builds the LLM client for codergen nodes.
///
/// Uses an OpenAI-compatible endpoint when an API key is configured
/// (`HEDDLE_API_KEY` or `OPENAI_API_KEY`); otherwise a mock client, so dry
/// runs work offline.
fn build_llm_client() -> Result<Arc<dyn LlmClient>, CliError> {
    let key = std::env::var("HEDDLE_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok();
    match key {
        Some(key) => {
            let base_url = std::env::var("HEDDLE_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
            Ok(Arc::new(OpenAiCompatClient::new(base_url, key)?))
        }
        None => {
            tracing::warn!("no API key configured; codergen nodes use a mock LLM");
            Ok(Arc::new(MockClient::with_text(
                "No LLM configured; this is a dry-run response.",
            )))
        }
    }
}

fn build_registry(model: &str) -> Result<HandlerRegistry, CliError> {
    let mut registry = HandlerRegistry::new();
    register_builtin_handlers(&mut registry, Some(Arc::new(ConsoleInterviewer::new())));

    let llm_client = build_llm_client()?;
    let env = Arc::new(LocalExecutionEnvironment::new());
    let profile = Arc::new(ProviderProfile::new(
        "openai",
        model,
        CODERGEN_BASE_INSTRUCTIONS,
    ));
    let codergen = Arc::new(CodergenHandler::new(llm_client, profile, env.clone()));
    registry.register("codergen", codergen.clone());
    registry.register("tool", Arc::new(ToolHandler::new(env)));
    registry.set_default(codergen);
    Ok(registry)
}

fn progress_bus() -> Arc<EventBus> {
    let bus = Arc::new(EventBus::new());
    bus.on_all(|event: &PipelineEvent| match event {
        PipelineEvent::PipelineStarted { graph_name } => {
            eprintln!("pipeline `{}` started", graph_name)
        }
        PipelineEvent::StageStarted { node_id } => eprintln!("  stage {} ...", node_id),
        PipelineEvent::StageRetrying {
            node_id,
            attempt,
            delay_ms,
        } => eprintln!("  stage {} retrying (attempt {}, {}ms)", node_id, attempt, delay_ms),
        PipelineEvent::StageCompleted { node_id, outcome } => {
            eprintln!("  stage {} -> {}", node_id, outcome.status)
        }
        PipelineEvent::CheckpointSaved { .. } => {}
        PipelineEvent::PipelineCompleted { outcome, .. } => {
            eprintln!("pipeline completed: {}", outcome.status)
        }
        PipelineEvent::PipelineFailed { error, .. } => eprintln!("pipeline failed: {}", error),
    });
    bus
}

/// Runs one CLI command; returns the process exit code.
pub async fn execute(cli: Cli) -> Result<u8, CliError> {
    match cli.command {
        Command::Check { graph } => {
            let graph = load_graph(&graph)?;
            check_graph(&graph)?;
            println!(
                "ok: {} nodes, {} edges",
                graph.nodes.len(),
                graph.edges.len()
            );
            Ok(0)
        }
        Command::Render { graph } => {
            let graph = load_graph(&graph)?;
            println!("digraph {} (goal: {})", graph.name, graph.goal());
            let mut ids: Vec<&String> = graph.nodes.keys().collect();
            ids.sort();
            for id in ids {
                let node = &graph.nodes[id];
                println!("  node {} [shape={}]", node.id, node.shape);
            }
            for edge in &graph.edges {
                let mut extras = Vec::new();
                if !edge.label.is_empty() {
                    extras.push(format!("label={:?}", edge.label));
                }
                if !edge.condition.is_empty() {
                    extras.push(format!("condition={:?}", edge.condition));
                }
                let suffix = if extras.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", extras.join(", "))
                };
                println!("  {} -> {}{}", edge.from_node, edge.to_node, suffix);
            }
            Ok(0)
        }
        Command::Run {
            graph,
            logs_root,
            resume,
            seeds,
            model,
            quiet,
        } => {
            let graph = load_graph(&graph)?;
            check_graph(&graph)?;

            let registry = build_registry(&model)?;
            let context = Context::with_values(parse_seeds(&seeds)?);

            let mut engine = Engine::new(graph, registry).with_context(context);
            if !quiet {
                engine = engine.with_event_bus(progress_bus());
            }
            if let Some(logs_root) = logs_root {
                engine = engine.with_logs_root(logs_root);
            }
            if let Some(resume) = resume {
                engine = engine.with_checkpoint(Checkpoint::load(&resume)?);
            }

            let outcome = engine.run().await?;
            Ok(match outcome.status {
                Status::Success | Status::PartialSuccess => 0,
                _ => 1,
            })
        }
    }
}
