//! Provider profiles: model, base instructions, and the tool belt.
//!
//! A profile bundles everything a session needs to talk to one provider
//! family: which model, what base system prompt, which instruction files to
//! discover, and which tools to expose.

use crate::environment::ExecutionEnvironment;
use crate::prompts::build_system_prompt;
use crate::tools::core::register_core_tools;
use crate::tools::patch::register_apply_patch;
use crate::tools::{ToolDefinition, ToolRegistry};

/// Configuration for one provider family.
#[derive(Clone)]
pub struct ProviderProfile {
    /// Provider id, e.g. `anthropic`; selects instruction-file names.
    pub id: String,
    /// Model requested on completions.
    pub model: String,
    /// Lowest-priority system prompt layer.
    pub base_instructions: String,
    /// Tools exposed to the model.
    pub tool_registry: ToolRegistry,
    /// Highest-priority system prompt layer.
    pub user_instructions: Option<String>,
    /// Named provider to route requests to; `None` uses the client default.
    pub provider: Option<String>,
}

impl ProviderProfile {
    /// Profile with the core tool belt (read/write/edit/shell/grep/glob).
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        base_instructions: impl Into<String>,
    ) -> Self {
        let mut tool_registry = ToolRegistry::new();
        register_core_tools(&mut tool_registry, &[]);
        Self {
            id: id.into(),
            model: model.into(),
            base_instructions: base_instructions.into(),
            tool_registry,
            user_instructions: None,
            provider: None,
        }
    }

    /// Profile whose edit tool is the structured patch applier instead of
    /// `edit_file`.
    pub fn with_patch_tool(
        id: impl Into<String>,
        model: impl Into<String>,
        base_instructions: impl Into<String>,
    ) -> Self {
        let mut tool_registry = ToolRegistry::new();
        register_core_tools(&mut tool_registry, &["edit_file"]);
        register_apply_patch(&mut tool_registry);
        Self {
            id: id.into(),
            model: model.into(),
            base_instructions: base_instructions.into(),
            tool_registry,
            user_instructions: None,
            provider: None,
        }
    }

    /// Replaces the tool registry (builder).
    pub fn with_tool_registry(mut self, tool_registry: ToolRegistry) -> Self {
        self.tool_registry = tool_registry;
        self
    }

    /// Sets the user-instruction override layer (builder).
    pub fn with_user_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.user_instructions = Some(instructions.into());
        self
    }

    /// Tool definitions in registration order.
    pub fn tools(&self) -> Vec<ToolDefinition> {
        self.tool_registry.definitions()
    }

    /// Renders the layered system prompt for one request.
    pub async fn build_system_prompt(&self, env: &dyn ExecutionEnvironment) -> String {
        build_system_prompt(
            &self.base_instructions,
            env,
            &self.tools(),
            &self.model,
            &self.id,
            self.user_instructions.as_deref(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::LocalExecutionEnvironment;

    #[test]
    fn default_profile_carries_core_tools() {
        let profile = ProviderProfile::new("anthropic", "m", "base");
        let names: Vec<String> = profile.tools().into_iter().map(|d| d.name).collect();
        assert!(names.contains(&"edit_file".to_string()));
        assert!(names.contains(&"shell".to_string()));
        assert!(!names.contains(&"apply_patch".to_string()));
    }

    #[test]
    fn patch_profile_swaps_edit_for_apply_patch() {
        let profile = ProviderProfile::with_patch_tool("openai", "m", "base");
        let names: Vec<String> = profile.tools().into_iter().map(|d| d.name).collect();
        assert!(!names.contains(&"edit_file".to_string()));
        assert!(names.contains(&"apply_patch".to_string()));
    }

    #[tokio::test]
    async fn system_prompt_contains_base_and_tools() {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = LocalExecutionEnvironment::with_working_dir(dir.path().display().to_string());
        let profile = ProviderProfile::new("anthropic", "test-model", "You are a careful engineer.")
            .with_user_instructions("Prefer small diffs.");
        let prompt = profile.build_system_prompt(&env).await;
        assert!(prompt.contains("You are a careful engineer."));
        assert!(prompt.contains("### read_file"));
        assert!(prompt.contains("Model: test-model"));
        assert!(prompt.ends_with("Prefer small diffs."));
    }
}
