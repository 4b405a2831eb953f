//! Codergen handler: the agent loop as a pipeline node.
//!
//! Box-shaped nodes default to this handler. Each execution builds a fresh
//! [`Session`] (honoring per-node model/provider/effort overrides), runs the
//! node's prompt to completion, writes the final assistant text under the
//! stage directory, and maps the result to an [`Outcome`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use heddle::{Context, Graph, Handler, HandlerError, Node, Outcome};
use llm::LlmClient;

use crate::config::SessionConfig;
use crate::environment::ExecutionEnvironment;
use crate::profile::ProviderProfile;
use crate::session::Session;

/// Pipeline handler backed by the agent loop.
pub struct CodergenHandler {
    llm_client: Arc<dyn LlmClient>,
    profile: Arc<ProviderProfile>,
    env: Arc<dyn ExecutionEnvironment>,
    session_config: SessionConfig,
}

impl CodergenHandler {
    pub fn new(
        llm_client: Arc<dyn LlmClient>,
        profile: Arc<ProviderProfile>,
        env: Arc<dyn ExecutionEnvironment>,
    ) -> Self {
        Self {
            llm_client,
            profile,
            env,
            session_config: SessionConfig::default(),
        }
    }

    /// Overrides the session config used per node (builder).
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Per-node profile: the base profile with node LLM overrides applied.
    fn profile_for(&self, node: &Node, graph: &Graph) -> ProviderProfile {
        let mut profile = (*self.profile).clone();
        if let Some(model) = &node.llm_model {
            profile.model = model.clone();
        } else if let Some(model) = graph.attributes.get("model") {
            profile.model = model.clone();
        }
        if let Some(provider) = &node.llm_provider {
            profile.provider = Some(provider.clone());
        }
        profile
    }

    fn config_for(&self, node: &Node) -> SessionConfig {
        let mut config = self.session_config.clone();
        if let Some(effort) = &node.reasoning_effort {
            config.reasoning_effort = Some(effort.clone());
        }
        config
    }
}

/// Scans a response for a routing hint line (`NEXT: <label>`).
fn extract_next_label(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        line.trim()
            .strip_prefix("NEXT:")
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
    })
}

#[async_trait]
impl Handler for CodergenHandler {
    async fn execute(
        &self,
        node: &Node,
        ctx: &Context,
        graph: &Graph,
        stage_dir: &Path,
    ) -> Result<Outcome, HandlerError> {
        let prompt = if node.prompt.is_empty() {
            node.label.clone()
        } else {
            node.prompt.clone()
        };
        if prompt.is_empty() {
            return Ok(Outcome::success());
        }

        // The graph goal travels with every task prompt.
        let goal = ctx.get_string("graph.goal").unwrap_or_default();
        let task = if goal.is_empty() {
            prompt
        } else {
            format!("Goal: {}\n\n{}", goal, prompt)
        };

        let profile = Arc::new(self.profile_for(node, graph));
        let mut session = Session::with_config(
            self.llm_client.clone(),
            profile,
            self.env.clone(),
            self.config_for(node),
            0,
        );

        tracing::info!(node = %node.id, session = %session.id, "codergen stage");
        let turn = session
            .process_input(task)
            .await
            .map_err(|e| HandlerError::msg(e.to_string()))?;

        std::fs::write(stage_dir.join("output.md"), &turn.content)?;

        let mut outcome = Outcome::success()
            .with_context_update("last_response", turn.content.clone())
            .with_context_update(format!("{}.output", node.id), turn.content.clone());
        if let Some(label) = extract_next_label(&turn.content) {
            outcome.preferred_label = label;
        }
        Ok(outcome)
    }
}
